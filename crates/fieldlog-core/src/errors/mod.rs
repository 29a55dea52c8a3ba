//! Error handling for fieldlog.
//! One error enum per subsystem, `thiserror` only. Every error is `Clone`
//! so that callers coalesced onto one in-flight lock holder can each
//! receive the same result.

pub mod conflict_error;
pub mod storage_error;
pub mod sync_error;

pub use conflict_error::ConflictError;
pub use storage_error::StorageError;
pub use sync_error::SyncError;

/// Top-level error for every fieldlog crate.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FieldlogError {
    #[error(transparent)]
    StorageError(#[from] StorageError),

    #[error(transparent)]
    SyncError(#[from] SyncError),

    #[error(transparent)]
    ConflictError(#[from] ConflictError),

    /// Malformed input rejected before any state mutation.
    #[error("validation failed: {0}")]
    ValidationError(String),

    #[error("serialization failed: {0}")]
    SerializationError(String),

    #[error("invalid configuration: {0}")]
    ConfigError(String),
}

impl FieldlogError {
    /// Whether this error came from the remote store being unreachable.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            FieldlogError::SyncError(SyncError::NetworkError { .. } | SyncError::Offline)
        )
    }
}

impl From<serde_json::Error> for FieldlogError {
    fn from(e: serde_json::Error) -> Self {
        FieldlogError::SerializationError(e.to_string())
    }
}

pub type FieldlogResult<T> = Result<T, FieldlogError>;
