use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("unknown action type '{0}'")]
    UnknownAction(String),
    #[error("unknown event name '{0}'")]
    UnknownEvent(String),
}
