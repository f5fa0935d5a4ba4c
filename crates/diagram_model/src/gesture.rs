//! Ephemeral per-gesture interaction state.

use serde::{Deserialize, Serialize};

use crate::domain::{Edge, Node, Point, Size};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResizeState {
    pub node_id: String,
    pub start_position: Point,
    pub start_size: Size,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkingState {
    pub source_node_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_port_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temporary_edge: Option<Edge>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotationState {
    pub node_id: String,
    pub start_angle: f64,
    pub pivot: Point,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraggingState {
    pub node_ids: Vec<String>,
    pub start_point: Point,
    #[serde(default)]
    pub accumulated_delta: Point,
}

/// Panning is only in progress while `active` is set; the sub-state may
/// outlive the gesture to keep the last pointer position.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PanningState {
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_point: Option<Point>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionState {
    pub start_point: Point,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_point: Option<Point>,
    #[serde(default)]
    pub additive: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyPasteState {
    pub copied_nodes: Vec<Node>,
    pub copied_edges: Vec<Edge>,
    #[serde(default)]
    pub paste_count: u32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HighlightGroupState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
}

/// One optional slot per named gesture. A slot is present exactly while its
/// gesture is tracked.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resize: Option<ResizeState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linking: Option<LinkingState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<RotationState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dragging: Option<DraggingState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub panning: Option<PanningState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection: Option<SelectionState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copy_paste: Option<CopyPasteState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highlight_group: Option<HighlightGroupState>,
}
