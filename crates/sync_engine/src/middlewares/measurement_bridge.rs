use async_trait::async_trait;

use crate::{
    context::TransactionContext,
    error::Result,
    pipeline::{Middleware, Next, Outcome},
};

use super::MEASUREMENT_TRACKING;

/// Hands the committed diff to the tracker so waiters can tell when the view
/// has finished laying out what this transaction touched. Registration
/// happens when the engine publishes; a cancelled or failed transaction
/// leaves the tracker alone.
pub struct MeasurementTrackingMiddleware;

#[async_trait]
impl Middleware for MeasurementTrackingMiddleware {
    fn name(&self) -> &str {
        MEASUREMENT_TRACKING
    }

    async fn execute(&self, ctx: &mut TransactionContext, next: Next<'_>) -> Result<Outcome> {
        let outcome = next.run(ctx, None).await?;
        if outcome.is_committed() {
            ctx.track_measurements_on_publish();
        }
        Ok(outcome)
    }
}
