use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    context::TransactionContext,
    error::Result,
    pipeline::{Middleware, Next, Outcome},
};

use super::INTERNAL_ID;

pub type IdGenerator = Arc<dyn Fn() -> String + Send + Sync>;

pub fn uuid_generator() -> IdGenerator {
    Arc::new(|| uuid::Uuid::new_v4().to_string())
}

/// Stamps every added node with a fresh render key, replacing any key the
/// node already carries.
pub struct InternalIdMiddleware {
    generate: IdGenerator,
}

impl InternalIdMiddleware {
    pub fn new(generate: IdGenerator) -> Self {
        Self { generate }
    }
}

impl Default for InternalIdMiddleware {
    fn default() -> Self {
        Self::new(uuid_generator())
    }
}

#[async_trait]
impl Middleware for InternalIdMiddleware {
    fn name(&self) -> &str {
        INTERNAL_ID
    }

    async fn execute(&self, ctx: &mut TransactionContext, next: Next<'_>) -> Result<Outcome> {
        let has_additions = ctx
            .update()
            .nodes_to_add
            .as_ref()
            .is_some_and(|nodes| !nodes.is_empty());
        if !has_additions {
            return next.run(ctx, None).await;
        }

        let mut update = ctx.update().clone();
        for node in update.nodes_to_add.iter_mut().flatten() {
            node.internal_id = Some((self.generate)());
        }
        next.run(ctx, Some(update)).await
    }
}
