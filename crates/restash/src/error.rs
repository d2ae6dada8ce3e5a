//! Error types for the restash persistence layer.

use thiserror::Error;

/// Result type alias for persistence operations.
pub type PersistResult<T> = Result<T, PersistError>;

/// Errors that can occur while persisting or restoring state.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("failed to open store: {0}")]
    Open(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),
}
