//! Transaction and event synchronization for an interactive diagram editor.
//!
//! A [`DiagramEngine`] runs every requested state change through an ordered
//! middleware chain, commits it to a working copy, publishes the result and
//! only then delivers the domain events the change produced. Gesture state,
//! layout-measurement settling and same-turn batching of port and label
//! mutations live alongside it.

pub mod action_state;
pub mod batch;
pub mod config;
pub mod context;
pub mod emitters;
pub mod engine;
pub mod error;
pub mod event_manager;
pub mod measurement;
pub mod middlewares;
pub mod pipeline;

pub use action_state::ActionStateManager;
pub use batch::{BatchProcessor, LabelBatchProcessor, PortBatchProcessor};
pub use config::{EngineConfig, MeasurementConfig};
pub use context::{EdgeProperty, EngineEnvironment, HistoryEntry, NodeProperty, TransactionContext};
pub use emitters::EventEmitter;
pub use engine::{DiagramEngine, DiagramEngineBuilder};
pub use error::{EngineError, Result};
pub use event_manager::{EventManager, Unsubscribe};
pub use measurement::{MeasurementHandle, MeasurementTracker, TrackerPhase};
pub use middlewares::IdGenerator;
pub use pipeline::{Flow, Middleware, MiddlewareChain, Next, Outcome};

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;
