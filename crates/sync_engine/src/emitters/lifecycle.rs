use diagram_model::{ActionType, DiagramEvent, GroupChange};

use super::{after_edges, after_nodes, EventEmitter};
use crate::{
    context::{NodeProperty, TransactionContext},
    event_manager::EventManager,
};

/// Announces the initial diagram once the view has measured it. The event is
/// handed back to the engine, which delivers it after publishing the state
/// and waiting for the tracker to settle.
pub struct DiagramInitEmitter;

impl EventEmitter for DiagramInitEmitter {
    fn name(&self) -> &str {
        "diagram-init"
    }

    fn emit(&self, ctx: &TransactionContext, _events: &EventManager) -> anyhow::Result<()> {
        if !ctx.has_action(ActionType::Init) {
            return Ok(());
        }
        ctx.emit_when_measured(DiagramEvent::DiagramInitialized {
            nodes: ctx.after().nodes.clone(),
            edges: ctx.after().edges.clone(),
            viewport: ctx.viewport(),
        });
        Ok(())
    }
}

pub struct ViewportChangedEmitter;

impl EventEmitter for ViewportChangedEmitter {
    fn name(&self) -> &str {
        "viewport-changed"
    }

    fn emit(&self, ctx: &TransactionContext, events: &EventManager) -> anyhow::Result<()> {
        if !ctx.viewport_changed() {
            return Ok(());
        }
        events.deferred_emit(DiagramEvent::ViewportChanged {
            viewport: ctx.viewport(),
            previous: ctx.before().metadata.viewport,
        });
        Ok(())
    }
}

pub struct EdgeDrawnEmitter;

impl EventEmitter for EdgeDrawnEmitter {
    fn name(&self) -> &str {
        "edge-drawn"
    }

    fn emit(&self, ctx: &TransactionContext, events: &EventManager) -> anyhow::Result<()> {
        if !ctx.has_action(ActionType::FinishLinking) {
            return Ok(());
        }
        for edge in after_edges(ctx, &ctx.added_edge_ids()) {
            events.deferred_emit(DiagramEvent::EdgeDrawn { edge });
        }
        Ok(())
    }
}

pub struct ClipboardPastedEmitter;

impl EventEmitter for ClipboardPastedEmitter {
    fn name(&self) -> &str {
        "clipboard-pasted"
    }

    fn emit(&self, ctx: &TransactionContext, events: &EventManager) -> anyhow::Result<()> {
        if !ctx.has_action(ActionType::Paste) {
            return Ok(());
        }
        let nodes = after_nodes(ctx, &ctx.added_node_ids());
        let edges = after_edges(ctx, &ctx.added_edge_ids());
        if nodes.is_empty() && edges.is_empty() {
            return Ok(());
        }
        events.deferred_emit(DiagramEvent::ClipboardPasted { nodes, edges });
        Ok(())
    }
}

pub struct PaletteDropEmitter;

impl EventEmitter for PaletteDropEmitter {
    fn name(&self) -> &str {
        "palette-item-dropped"
    }

    fn emit(&self, ctx: &TransactionContext, events: &EventManager) -> anyhow::Result<()> {
        if !ctx.has_action(ActionType::PaletteDropNode) {
            return Ok(());
        }
        for node in after_nodes(ctx, &ctx.added_node_ids()) {
            events.deferred_emit(DiagramEvent::PaletteItemDropped { node });
        }
        Ok(())
    }
}

/// Any group reassignment, regardless of selection. Moving a node between
/// groups counts as grouped; only detaching counts as ungrouped.
pub struct GroupMembershipEmitter;

impl EventEmitter for GroupMembershipEmitter {
    fn name(&self) -> &str {
        "group-membership-changed"
    }

    fn emit(&self, ctx: &TransactionContext, events: &EventManager) -> anyhow::Result<()> {
        let mut grouped = Vec::new();
        let mut ungrouped = Vec::new();
        for id in ctx.changed_node_ids(NodeProperty::GroupId) {
            let (Some(before), Some(after)) =
                (ctx.before_nodes().get(&id), ctx.after_nodes().get(&id))
            else {
                continue;
            };
            let change = GroupChange {
                node_id: id.clone(),
                group_id: after.group_id.clone(),
                previous_group_id: before.group_id.clone(),
            };
            if change.group_id.is_some() {
                grouped.push(change);
            } else {
                ungrouped.push(change);
            }
        }
        if grouped.is_empty() && ungrouped.is_empty() {
            return Ok(());
        }
        events.deferred_emit(DiagramEvent::GroupMembershipChanged { grouped, ungrouped });
        Ok(())
    }
}
