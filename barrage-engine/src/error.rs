//! Error types for the load engine

use barrage_config::ConfigError;
use barrage_http::HttpError;
use thiserror::Error;

/// Engine errors
///
/// Transport failures of individual requests never appear here; they are
/// recorded as outcomes with status 0. `Transport` covers failures to set up
/// the transport itself.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Evaluation error: {0}")]
    Evaluation(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Result sink error: {0}")]
    Sink(String),
}

impl EngineError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

// Request building errors are caller mistakes, client build errors are not
impl From<HttpError> for EngineError {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::ClientBuild(e) => Self::Transport(e.to_string()),
            other => Self::Validation(other.to_string()),
        }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        Self::Sink(err.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
