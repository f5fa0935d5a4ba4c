use std::{fmt, str::FromStr, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
    domain::{Edge, Node, Size, Viewport},
    error::ModelError,
    gesture::ActionState,
};

macro_rules! event_kinds {
    ($($variant:ident => $name:literal),+ $(,)?) => {
        /// Subscription key for [`DiagramEvent`]s.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum EventKind {
            $(
                #[serde(rename = $name)]
                $variant,
            )+
        }

        impl EventKind {
            pub const ALL: &'static [EventKind] = &[$(EventKind::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $(EventKind::$variant => $name,)+
                }
            }
        }

        impl FromStr for EventKind {
            type Err = ModelError;

            fn from_str(name: &str) -> Result<Self, Self::Err> {
                match name {
                    $($name => Ok(EventKind::$variant),)+
                    other => Err(ModelError::UnknownEvent(other.to_string())),
                }
            }
        }
    };
}

event_kinds! {
    DiagramInitialized => "diagram-initialized",
    SelectionMoved => "selection-moved",
    SelectionChanged => "selection-changed",
    SelectionRemoved => "selection-removed",
    SelectionRotated => "selection-rotated",
    SelectionGroupChanged => "selection-group-changed",
    SelectionGrouped => "selection-grouped",
    SelectionGestureEnded => "selection-gesture-ended",
    ViewportChanged => "viewport-changed",
    EdgeDrawn => "edge-drawn",
    ClipboardPasted => "clipboard-pasted",
    NodeResized => "node-resized",
    NodeDragStarted => "node-drag-started",
    NodeDragEnded => "node-drag-ended",
    NodeResizeStarted => "node-resize-started",
    NodeResizeEnded => "node-resize-ended",
    NodeRotateStarted => "node-rotate-started",
    NodeRotateEnded => "node-rotate-ended",
    PaletteItemDropped => "palette-item-dropped",
    GroupMembershipChanged => "group-membership-changed",
    ActionStateChanged => "action-state-changed",
}

impl EventKind {
    /// Internal kinds are reserved for middleware authors and are not part of
    /// the public catalogue.
    pub fn is_internal(self) -> bool {
        matches!(self, EventKind::ActionStateChanged)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupChange {
    pub node_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_group_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum DiagramEvent {
    DiagramInitialized {
        nodes: Vec<Node>,
        edges: Vec<Edge>,
        viewport: Viewport,
    },
    SelectionMoved {
        nodes: Vec<Node>,
    },
    SelectionChanged {
        selected_nodes: Vec<Node>,
        selected_edges: Vec<Edge>,
        previous_node_ids: Vec<String>,
        previous_edge_ids: Vec<String>,
    },
    SelectionRemoved {
        deleted_nodes: Vec<Node>,
        deleted_edges: Vec<Edge>,
    },
    SelectionRotated {
        node: Node,
        angle: f64,
        previous_angle: f64,
    },
    SelectionGroupChanged {
        changes: Vec<GroupChange>,
    },
    SelectionGrouped {
        group_id: String,
        nodes: Vec<Node>,
    },
    SelectionGestureEnded {
        nodes: Vec<Node>,
        edges: Vec<Edge>,
    },
    ViewportChanged {
        viewport: Viewport,
        previous: Viewport,
    },
    EdgeDrawn {
        edge: Edge,
    },
    ClipboardPasted {
        nodes: Vec<Node>,
        edges: Vec<Edge>,
    },
    NodeResized {
        node: Node,
        previous_size: Option<Size>,
    },
    NodeDragStarted {
        nodes: Vec<Node>,
    },
    NodeDragEnded {
        nodes: Vec<Node>,
    },
    NodeResizeStarted {
        node: Node,
    },
    NodeResizeEnded {
        node: Node,
    },
    NodeRotateStarted {
        node: Node,
    },
    NodeRotateEnded {
        node: Node,
    },
    PaletteItemDropped {
        node: Node,
    },
    GroupMembershipChanged {
        grouped: Vec<GroupChange>,
        ungrouped: Vec<GroupChange>,
    },
    ActionStateChanged(Arc<ActionState>),
}

impl DiagramEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            DiagramEvent::DiagramInitialized { .. } => EventKind::DiagramInitialized,
            DiagramEvent::SelectionMoved { .. } => EventKind::SelectionMoved,
            DiagramEvent::SelectionChanged { .. } => EventKind::SelectionChanged,
            DiagramEvent::SelectionRemoved { .. } => EventKind::SelectionRemoved,
            DiagramEvent::SelectionRotated { .. } => EventKind::SelectionRotated,
            DiagramEvent::SelectionGroupChanged { .. } => EventKind::SelectionGroupChanged,
            DiagramEvent::SelectionGrouped { .. } => EventKind::SelectionGrouped,
            DiagramEvent::SelectionGestureEnded { .. } => EventKind::SelectionGestureEnded,
            DiagramEvent::ViewportChanged { .. } => EventKind::ViewportChanged,
            DiagramEvent::EdgeDrawn { .. } => EventKind::EdgeDrawn,
            DiagramEvent::ClipboardPasted { .. } => EventKind::ClipboardPasted,
            DiagramEvent::NodeResized { .. } => EventKind::NodeResized,
            DiagramEvent::NodeDragStarted { .. } => EventKind::NodeDragStarted,
            DiagramEvent::NodeDragEnded { .. } => EventKind::NodeDragEnded,
            DiagramEvent::NodeResizeStarted { .. } => EventKind::NodeResizeStarted,
            DiagramEvent::NodeResizeEnded { .. } => EventKind::NodeResizeEnded,
            DiagramEvent::NodeRotateStarted { .. } => EventKind::NodeRotateStarted,
            DiagramEvent::NodeRotateEnded { .. } => EventKind::NodeRotateEnded,
            DiagramEvent::PaletteItemDropped { .. } => EventKind::PaletteItemDropped,
            DiagramEvent::GroupMembershipChanged { .. } => EventKind::GroupMembershipChanged,
            DiagramEvent::ActionStateChanged(_) => EventKind::ActionStateChanged,
        }
    }
}
