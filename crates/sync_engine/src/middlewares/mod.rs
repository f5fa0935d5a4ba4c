//! Built-in middleware wrapped around caller-supplied business middleware.

mod event_dispatcher;
mod internal_id;
mod logger;
mod measurement_bridge;

pub use event_dispatcher::EventEmitterMiddleware;
pub use internal_id::{uuid_generator, IdGenerator, InternalIdMiddleware};
pub use logger::LoggerMiddleware;
pub use measurement_bridge::MeasurementTrackingMiddleware;

pub const INTERNAL_ID: &str = "internal-id";
pub const MEASUREMENT_TRACKING: &str = "measurement-tracking";
pub const EVENT_EMITTER: &str = "event-emitter";
pub const LOGGER: &str = "logger";

#[cfg(test)]
#[path = "../tests/middleware_tests.rs"]
mod tests;
