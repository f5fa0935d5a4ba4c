//! Owner of the ephemeral gesture state of one diagram.
//!
//! Every write emits exactly one [`DiagramEvent::ActionStateChanged`] carrying
//! a fresh copy of the whole record. Readers only ever receive snapshots.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use diagram_model::{
    gesture::{
        CopyPasteState, DraggingState, HighlightGroupState, LinkingState, PanningState,
        ResizeState, RotationState, SelectionState,
    },
    ActionState, DiagramEvent,
};

use crate::event_manager::EventManager;

macro_rules! sub_state {
    ($field:ident, $ty:ty, $set:ident, $clear:ident, $is:ident) => {
        pub fn $field(&self) -> Option<$ty> {
            self.state().$field.clone()
        }

        pub fn $set(&self, value: Option<$ty>) {
            self.write(|state| state.$field = value);
        }

        pub fn $clear(&self) {
            self.$set(None);
        }

        pub fn $is(&self) -> bool {
            self.state().$field.is_some()
        }
    };
}

#[derive(Clone)]
pub struct ActionStateManager {
    state: Arc<Mutex<ActionState>>,
    events: EventManager,
}

impl ActionStateManager {
    pub fn new(events: EventManager) -> Self {
        Self {
            state: Arc::new(Mutex::new(ActionState::default())),
            events,
        }
    }

    sub_state!(resize, ResizeState, set_resize, clear_resize, is_resizing);
    sub_state!(linking, LinkingState, set_linking, clear_linking, is_linking);
    sub_state!(rotation, RotationState, set_rotation, clear_rotation, is_rotating);
    sub_state!(dragging, DraggingState, set_dragging, clear_dragging, is_dragging);
    sub_state!(panning, PanningState, set_panning, clear_panning, has_panning_state);
    sub_state!(selection, SelectionState, set_selection, clear_selection, is_selecting);
    sub_state!(copy_paste, CopyPasteState, set_copy_paste, clear_copy_paste, is_copy_pasting);
    sub_state!(
        highlight_group,
        HighlightGroupState,
        set_highlight_group,
        clear_highlight_group,
        is_highlighting_group
    );

    /// Panning counts only while the sub-state is flagged active.
    pub fn is_panning(&self) -> bool {
        self.state()
            .panning
            .as_ref()
            .is_some_and(|panning| panning.active)
    }

    pub fn snapshot(&self) -> ActionState {
        self.state().clone()
    }

    /// Applies several sub-state changes as a single write and a single emission.
    pub fn update(&self, apply: impl FnOnce(&mut ActionState)) {
        self.write(apply);
    }

    pub fn clear_all(&self) {
        self.write(|state| *state = ActionState::default());
    }

    fn write(&self, apply: impl FnOnce(&mut ActionState)) {
        let snapshot = {
            let mut state = self.state();
            apply(&mut *state);
            Arc::new(state.clone())
        };
        self.events.emit(DiagramEvent::ActionStateChanged(snapshot));
    }

    fn state(&self) -> MutexGuard<'_, ActionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[path = "tests/action_state_tests.rs"]
mod tests;
