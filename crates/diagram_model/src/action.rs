use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

macro_rules! action_types {
    ($($variant:ident => $name:literal),+ $(,)?) => {
        /// Command family a transaction was requested for.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum ActionType {
            $(
                #[serde(rename = $name)]
                $variant,
            )+
        }

        impl ActionType {
            pub const ALL: &'static [ActionType] = &[$(ActionType::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $(ActionType::$variant => $name,)+
                }
            }
        }

        impl FromStr for ActionType {
            type Err = ModelError;

            fn from_str(name: &str) -> Result<Self, Self::Err> {
                match name {
                    $($name => Ok(ActionType::$variant),)+
                    other => Err(ModelError::UnknownAction(other.to_string())),
                }
            }
        }
    };
}

action_types! {
    Init => "init",
    AddNodes => "addNodes",
    UpdateNode => "updateNode",
    AddEdges => "addEdges",
    UpdateEdge => "updateEdge",
    DeleteElements => "deleteElements",
    MoveNodesBy => "moveNodesBy",
    MoveNodesStart => "moveNodesStart",
    MoveNodesStop => "moveNodesStop",
    ResizeNode => "resizeNode",
    ResizeStart => "resizeStart",
    ResizeEnd => "resizeEnd",
    RotateNodeTo => "rotateNodeTo",
    RotateStart => "rotateStart",
    RotateEnd => "rotateEnd",
    ChangeSelection => "changeSelection",
    SelectEnd => "selectEnd",
    DeleteSelection => "deleteSelection",
    Paste => "paste",
    StartLinking => "startLinking",
    FinishLinking => "finishLinking",
    MoveViewport => "moveViewport",
    Group => "group",
    PaletteDropNode => "paletteDropNode",
    UpdatePorts => "updatePorts",
    UpdateLabels => "updateLabels",
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
