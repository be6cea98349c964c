use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors surfaced by the recommendation engine.
///
/// Unknown users, unknown items and an untrained contextual model are *not*
/// represented here: each of those is resolved internally by a documented
/// fallback and never reaches the caller.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("factor dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("sentiment score out of range [0,1]: {0}")]
    InvalidScore(f32),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Persistence(err.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Persistence(err.to_string())
    }
}
