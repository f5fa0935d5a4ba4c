use std::{
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use async_trait::async_trait;
use tracing::error;

use crate::{
    context::TransactionContext,
    emitters::EventEmitter,
    error::Result,
    event_manager::{panic_message, EventManager},
    pipeline::{Middleware, Next, Outcome},
};

use super::EVENT_EMITTER;

/// Terminal dispatcher. Lets the rest of the chain commit first, then runs
/// every emitter unit against the committed maps. Deferred events carry the
/// transaction id so a later failure can withdraw them. A failing unit is
/// logged and skipped; its siblings still run.
pub struct EventEmitterMiddleware {
    events: EventManager,
    emitters: Vec<Arc<dyn EventEmitter>>,
}

impl EventEmitterMiddleware {
    pub fn new(events: EventManager, emitters: Vec<Arc<dyn EventEmitter>>) -> Self {
        Self { events, emitters }
    }

    pub fn emitter_names(&self) -> Vec<&str> {
        self.emitters.iter().map(|emitter| emitter.name()).collect()
    }
}

#[async_trait]
impl Middleware for EventEmitterMiddleware {
    fn name(&self) -> &str {
        EVENT_EMITTER
    }

    async fn execute(&self, ctx: &mut TransactionContext, next: Next<'_>) -> Result<Outcome> {
        let outcome = next.run(ctx, None).await?;
        if !outcome.is_committed() {
            return Ok(outcome);
        }

        let ctx = &*ctx;
        let events = self.events.scoped(ctx.id());
        for emitter in &self.emitters {
            let result = panic::catch_unwind(AssertUnwindSafe(|| emitter.emit(ctx, &events)));
            match result {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    error!(
                        emitter = emitter.name(),
                        error = %format!("{err:#}"),
                        "[EventEmitterMiddleware] emitter failed"
                    );
                }
                Err(payload) => {
                    error!(
                        emitter = emitter.name(),
                        panic = panic_message(&*payload),
                        "[EventEmitterMiddleware] emitter panicked"
                    );
                }
            }
        }
        Ok(outcome)
    }
}
