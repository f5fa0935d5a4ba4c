//! Emitter units run by the terminal dispatcher once a transaction commits.
//!
//! Units only read the context and publish through the event manager they
//! are handed. Events are queued with `deferred_emit` and delivered when the
//! engine flushes after publishing the new state; diagram initialization goes
//! through [`TransactionContext::emit_when_measured`] instead.

use std::sync::Arc;

use diagram_model::{Edge, Node};

use crate::{context::TransactionContext, event_manager::EventManager};

mod gestures;
mod lifecycle;
mod selection;

pub use gestures::{DragBoundaryEmitter, NodeGestureEmitter, NodeResizedEmitter};
pub use lifecycle::{
    ClipboardPastedEmitter, DiagramInitEmitter, EdgeDrawnEmitter, GroupMembershipEmitter,
    PaletteDropEmitter, ViewportChangedEmitter,
};
pub use selection::{
    SelectionChangedEmitter, SelectionGestureEndedEmitter, SelectionGroupChangedEmitter,
    SelectionGroupedEmitter, SelectionMovedEmitter, SelectionRemovedEmitter,
    SelectionRotatedEmitter,
};

pub trait EventEmitter: Send + Sync {
    fn name(&self) -> &str;

    fn emit(&self, ctx: &TransactionContext, events: &EventManager) -> anyhow::Result<()>;
}

/// Every unit of the public event catalogue, in dispatch order.
pub fn builtin_emitters() -> Vec<Arc<dyn EventEmitter>> {
    vec![
        Arc::new(DiagramInitEmitter),
        Arc::new(SelectionChangedEmitter),
        Arc::new(SelectionRemovedEmitter),
        Arc::new(SelectionMovedEmitter),
        Arc::new(SelectionRotatedEmitter),
        Arc::new(SelectionGroupChangedEmitter),
        Arc::new(SelectionGroupedEmitter),
        Arc::new(SelectionGestureEndedEmitter),
        Arc::new(ViewportChangedEmitter),
        Arc::new(EdgeDrawnEmitter),
        Arc::new(ClipboardPastedEmitter),
        Arc::new(NodeResizedEmitter),
        Arc::new(DragBoundaryEmitter::started()),
        Arc::new(DragBoundaryEmitter::ended()),
        Arc::new(NodeGestureEmitter::resize_started()),
        Arc::new(NodeGestureEmitter::resize_ended()),
        Arc::new(NodeGestureEmitter::rotate_started()),
        Arc::new(NodeGestureEmitter::rotate_ended()),
        Arc::new(PaletteDropEmitter),
        Arc::new(GroupMembershipEmitter),
    ]
}

fn after_nodes(ctx: &TransactionContext, ids: &[String]) -> Vec<Node> {
    ids.iter()
        .filter_map(|id| ctx.after_nodes().get(id).cloned())
        .collect()
}

fn after_edges(ctx: &TransactionContext, ids: &[String]) -> Vec<Edge> {
    ids.iter()
        .filter_map(|id| ctx.after_edges().get(id).cloned())
        .collect()
}

fn selected_nodes(ctx: &TransactionContext) -> Vec<Node> {
    ctx.after()
        .nodes
        .iter()
        .filter(|node| node.selected)
        .cloned()
        .collect()
}

fn selected_edges(ctx: &TransactionContext) -> Vec<Edge> {
    ctx.after()
        .edges
        .iter()
        .filter(|edge| edge.selected)
        .cloned()
        .collect()
}

#[cfg(test)]
#[path = "../tests/emitter_tests.rs"]
mod tests;
