use std::time::Instant;

use async_trait::async_trait;
use diagram_model::StateUpdate;
use tracing::debug;

use crate::{
    context::TransactionContext,
    error::Result,
    pipeline::{Middleware, Next, Outcome},
};

use super::LOGGER;

/// Debug trace of every transaction. Installed outermost when the engine
/// runs in debug mode.
pub struct LoggerMiddleware;

#[async_trait]
impl Middleware for LoggerMiddleware {
    fn name(&self) -> &str {
        LOGGER
    }

    async fn execute(&self, ctx: &mut TransactionContext, next: Next<'_>) -> Result<Outcome> {
        let started = Instant::now();
        debug!(
            actions = ?ctx.actions(),
            update = %summarize(ctx.update()),
            "[LoggerMiddleware] transaction started"
        );

        let result = next.run(ctx, None).await;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        match &result {
            Ok(outcome) => debug!(
                actions = ?ctx.actions(),
                outcome = ?outcome.flow(),
                committed = %summarize(ctx.update()),
                rewrites = ctx.history().len(),
                elapsed_ms,
                "[LoggerMiddleware] transaction finished"
            ),
            Err(err) => debug!(
                actions = ?ctx.actions(),
                %err,
                elapsed_ms,
                "[LoggerMiddleware] transaction failed"
            ),
        }
        result
    }
}

fn summarize(update: &StateUpdate) -> String {
    fn count<T>(list: &Option<Vec<T>>) -> usize {
        list.as_ref().map_or(0, Vec::len)
    }

    let mut summary = format!(
        "nodes +{} ~{} -{}, edges +{} ~{} -{}",
        count(&update.nodes_to_add),
        count(&update.nodes_to_update),
        count(&update.nodes_to_remove),
        count(&update.edges_to_add),
        count(&update.edges_to_update),
        count(&update.edges_to_remove),
    );
    if update.metadata_update.is_some() {
        summary.push_str(", metadata");
    }
    summary
}
