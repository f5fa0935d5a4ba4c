pub mod action;
pub mod domain;
pub mod error;
pub mod event;
pub mod gesture;
pub mod update;

pub use action::ActionType;
pub use domain::{
    Edge, EdgeLabel, EdgePatch, Metadata, MetadataPatch, Node, NodePatch, Point, Port, PortSide,
    Size, Viewport,
};
pub use error::ModelError;
pub use event::{DiagramEvent, EventKind, GroupChange};
pub use gesture::ActionState;
pub use update::{DiagramState, StateUpdate};

#[cfg(test)]
#[path = "tests/update_tests.rs"]
mod update_tests;

#[cfg(test)]
#[path = "tests/catalogue_tests.rs"]
mod catalogue_tests;
