use std::collections::HashSet;

use diagram_model::{ActionType, DiagramEvent, GroupChange};

use super::{after_nodes, selected_edges, selected_nodes, EventEmitter};
use crate::{
    context::{NodeProperty, TransactionContext},
    event_manager::EventManager,
};

pub struct SelectionChangedEmitter;

impl EventEmitter for SelectionChangedEmitter {
    fn name(&self) -> &str {
        "selection-changed"
    }

    fn emit(&self, ctx: &TransactionContext, events: &EventManager) -> anyhow::Result<()> {
        let previous_node_ids = ctx.before().selected_node_ids();
        let previous_edge_ids = ctx.before().selected_edge_ids();
        let current_node_ids = ctx.after().selected_node_ids();
        let current_edge_ids = ctx.after().selected_edge_ids();

        if same_ids(&previous_node_ids, &current_node_ids)
            && same_ids(&previous_edge_ids, &current_edge_ids)
        {
            return Ok(());
        }

        events.deferred_emit(DiagramEvent::SelectionChanged {
            selected_nodes: selected_nodes(ctx),
            selected_edges: selected_edges(ctx),
            previous_node_ids,
            previous_edge_ids,
        });
        Ok(())
    }
}

fn same_ids(left: &[String], right: &[String]) -> bool {
    left.iter().collect::<HashSet<_>>() == right.iter().collect::<HashSet<_>>()
}

pub struct SelectionRemovedEmitter;

impl EventEmitter for SelectionRemovedEmitter {
    fn name(&self) -> &str {
        "selection-removed"
    }

    fn emit(&self, ctx: &TransactionContext, events: &EventManager) -> anyhow::Result<()> {
        if !ctx.has_action(ActionType::DeleteSelection) {
            return Ok(());
        }
        let deleted_nodes: Vec<_> = ctx
            .removed_node_ids()
            .iter()
            .filter_map(|id| ctx.before_nodes().get(id).cloned())
            .collect();
        let deleted_edges: Vec<_> = ctx
            .removed_edge_ids()
            .iter()
            .filter_map(|id| ctx.before_edges().get(id).cloned())
            .collect();
        if deleted_nodes.is_empty() && deleted_edges.is_empty() {
            return Ok(());
        }

        events.deferred_emit(DiagramEvent::SelectionRemoved {
            deleted_nodes,
            deleted_edges,
        });
        Ok(())
    }
}

pub struct SelectionMovedEmitter;

impl EventEmitter for SelectionMovedEmitter {
    fn name(&self) -> &str {
        "selection-moved"
    }

    fn emit(&self, ctx: &TransactionContext, events: &EventManager) -> anyhow::Result<()> {
        if !ctx.has_action(ActionType::MoveNodesBy) {
            return Ok(());
        }
        let moved = ctx.changed_node_ids(NodeProperty::Position);
        if moved.is_empty() {
            return Ok(());
        }

        events.deferred_emit(DiagramEvent::SelectionMoved {
            nodes: after_nodes(ctx, &moved),
        });
        Ok(())
    }
}

pub struct SelectionRotatedEmitter;

impl EventEmitter for SelectionRotatedEmitter {
    fn name(&self) -> &str {
        "selection-rotated"
    }

    fn emit(&self, ctx: &TransactionContext, events: &EventManager) -> anyhow::Result<()> {
        if !ctx.has_action(ActionType::RotateNodeTo) {
            return Ok(());
        }
        for id in ctx.changed_node_ids(NodeProperty::Angle) {
            let (Some(before), Some(after)) = (ctx.before_nodes().get(&id), ctx.after_nodes().get(&id))
            else {
                continue;
            };
            events.deferred_emit(DiagramEvent::SelectionRotated {
                node: after.clone(),
                angle: after.angle,
                previous_angle: before.angle,
            });
        }
        Ok(())
    }
}

/// Group reassignment of nodes that were, or now are, selected.
pub struct SelectionGroupChangedEmitter;

impl EventEmitter for SelectionGroupChangedEmitter {
    fn name(&self) -> &str {
        "selection-group-changed"
    }

    fn emit(&self, ctx: &TransactionContext, events: &EventManager) -> anyhow::Result<()> {
        let changes: Vec<GroupChange> = ctx
            .changed_node_ids(NodeProperty::GroupId)
            .into_iter()
            .filter_map(|id| {
                let before = ctx.before_nodes().get(&id)?;
                let after = ctx.after_nodes().get(&id)?;
                (before.selected || after.selected).then(|| GroupChange {
                    node_id: id.clone(),
                    group_id: after.group_id.clone(),
                    previous_group_id: before.group_id.clone(),
                })
            })
            .collect();
        if changes.is_empty() {
            return Ok(());
        }

        events.deferred_emit(DiagramEvent::SelectionGroupChanged { changes });
        Ok(())
    }
}

pub struct SelectionGroupedEmitter;

impl EventEmitter for SelectionGroupedEmitter {
    fn name(&self) -> &str {
        "selection-grouped"
    }

    fn emit(&self, ctx: &TransactionContext, events: &EventManager) -> anyhow::Result<()> {
        if !ctx.has_action(ActionType::Group) {
            return Ok(());
        }

        let created_group = after_nodes(ctx, &ctx.added_node_ids())
            .into_iter()
            .find(|node| node.is_group)
            .map(|node| node.id);
        let group_id = created_group.or_else(|| {
            ctx.changed_node_ids(NodeProperty::GroupId)
                .iter()
                .find_map(|id| ctx.after_nodes().get(id)?.group_id.clone())
        });
        let Some(group_id) = group_id else {
            return Ok(());
        };

        let nodes: Vec<_> = ctx
            .after()
            .nodes
            .iter()
            .filter(|node| node.group_id.as_deref() == Some(group_id.as_str()))
            .cloned()
            .collect();
        events.deferred_emit(DiagramEvent::SelectionGrouped { group_id, nodes });
        Ok(())
    }
}

pub struct SelectionGestureEndedEmitter;

impl EventEmitter for SelectionGestureEndedEmitter {
    fn name(&self) -> &str {
        "selection-gesture-ended"
    }

    fn emit(&self, ctx: &TransactionContext, events: &EventManager) -> anyhow::Result<()> {
        if !ctx.has_action(ActionType::SelectEnd) {
            return Ok(());
        }
        events.deferred_emit(DiagramEvent::SelectionGestureEnded {
            nodes: selected_nodes(ctx),
            edges: selected_edges(ctx),
        });
        Ok(())
    }
}
