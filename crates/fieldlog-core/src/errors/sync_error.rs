/// Remote submission and coordination errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SyncError {
    #[error("network error: {reason}")]
    NetworkError { reason: String },

    #[error("remote store rejected operation {operation_id}: {reason}")]
    Rejected { operation_id: String, reason: String },

    #[error("device is offline")]
    Offline,

    #[error("in-flight task for lock {key} ended without a result")]
    LockAbandoned { key: String },

    #[error("optimistic update {update_id} timed out")]
    Timeout { update_id: String },
}
