use diagram_model::ModelError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("middleware '{0}' is not registered")]
    UnknownMiddleware(String),
    #[error("middleware '{0}' is already registered")]
    DuplicateMiddleware(String),
    #[error("middleware '{name}' failed: {source}")]
    Middleware {
        name: String,
        source: anyhow::Error,
    },
    #[error("diagram engine has been destroyed")]
    Destroyed,
    #[error("failed to load engine configuration: {0}")]
    Config(#[from] config::ConfigError),
}

impl EngineError {
    pub fn middleware(name: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::Middleware {
            name: name.into(),
            source: source.into(),
        }
    }
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
