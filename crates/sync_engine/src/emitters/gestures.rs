use diagram_model::{ActionType, DiagramEvent, Node};

use super::{after_nodes, selected_nodes, EventEmitter};
use crate::{
    context::{NodeProperty, TransactionContext},
    event_manager::EventManager,
};

pub struct NodeResizedEmitter;

impl EventEmitter for NodeResizedEmitter {
    fn name(&self) -> &str {
        "node-resized"
    }

    fn emit(&self, ctx: &TransactionContext, events: &EventManager) -> anyhow::Result<()> {
        if !ctx.has_action(ActionType::ResizeNode) {
            return Ok(());
        }
        for id in ctx.changed_node_ids(NodeProperty::Size) {
            let (Some(before), Some(after)) =
                (ctx.before_nodes().get(&id), ctx.after_nodes().get(&id))
            else {
                continue;
            };
            events.deferred_emit(DiagramEvent::NodeResized {
                node: after.clone(),
                previous_size: before.size,
            });
        }
        Ok(())
    }
}

/// Start and end of a drag; carries the selection being dragged.
pub struct DragBoundaryEmitter {
    name: &'static str,
    action: ActionType,
    build: fn(Vec<Node>) -> DiagramEvent,
}

impl DragBoundaryEmitter {
    pub fn started() -> Self {
        Self {
            name: "node-drag-started",
            action: ActionType::MoveNodesStart,
            build: |nodes| DiagramEvent::NodeDragStarted { nodes },
        }
    }

    pub fn ended() -> Self {
        Self {
            name: "node-drag-ended",
            action: ActionType::MoveNodesStop,
            build: |nodes| DiagramEvent::NodeDragEnded { nodes },
        }
    }
}

impl EventEmitter for DragBoundaryEmitter {
    fn name(&self) -> &str {
        self.name
    }

    fn emit(&self, ctx: &TransactionContext, events: &EventManager) -> anyhow::Result<()> {
        if !ctx.has_action(self.action) {
            return Ok(());
        }
        let nodes = selected_nodes(ctx);
        if nodes.is_empty() {
            return Ok(());
        }
        events.deferred_emit((self.build)(nodes));
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum Gesture {
    Resize,
    Rotate,
}

/// Start and end of a single-node resize or rotation.
pub struct NodeGestureEmitter {
    name: &'static str,
    action: ActionType,
    gesture: Gesture,
    build: fn(Node) -> DiagramEvent,
}

impl NodeGestureEmitter {
    pub fn resize_started() -> Self {
        Self {
            name: "node-resize-started",
            action: ActionType::ResizeStart,
            gesture: Gesture::Resize,
            build: |node| DiagramEvent::NodeResizeStarted { node },
        }
    }

    pub fn resize_ended() -> Self {
        Self {
            name: "node-resize-ended",
            action: ActionType::ResizeEnd,
            gesture: Gesture::Resize,
            build: |node| DiagramEvent::NodeResizeEnded { node },
        }
    }

    pub fn rotate_started() -> Self {
        Self {
            name: "node-rotate-started",
            action: ActionType::RotateStart,
            gesture: Gesture::Rotate,
            build: |node| DiagramEvent::NodeRotateStarted { node },
        }
    }

    pub fn rotate_ended() -> Self {
        Self {
            name: "node-rotate-ended",
            action: ActionType::RotateEnd,
            gesture: Gesture::Rotate,
            build: |node| DiagramEvent::NodeRotateEnded { node },
        }
    }

    /// The gesture's node as recorded in action state, else the first node
    /// whose geometry changed, else the first node the diff patched.
    fn target(&self, ctx: &TransactionContext) -> Option<Node> {
        let tracked = match self.gesture {
            Gesture::Resize => ctx.action_state().resize().map(|resize| resize.node_id),
            Gesture::Rotate => ctx.action_state().rotation().map(|rotation| rotation.node_id),
        };
        let property = match self.gesture {
            Gesture::Resize => NodeProperty::Size,
            Gesture::Rotate => NodeProperty::Angle,
        };
        let id = tracked
            .or_else(|| ctx.changed_node_ids(property).into_iter().next())
            .or_else(|| {
                ctx.update()
                    .nodes_to_update
                    .as_ref()
                    .and_then(|patches| patches.first())
                    .map(|patch| patch.id.clone())
            })?;
        after_nodes(ctx, &[id]).into_iter().next()
    }
}

impl EventEmitter for NodeGestureEmitter {
    fn name(&self) -> &str {
        self.name
    }

    fn emit(&self, ctx: &TransactionContext, events: &EventManager) -> anyhow::Result<()> {
        if !ctx.has_action(self.action) {
            return Ok(());
        }
        if let Some(node) = self.target(ctx) {
            events.deferred_emit((self.build)(node));
        }
        Ok(())
    }
}
