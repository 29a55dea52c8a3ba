/// Conflict resolution errors. A detected conflict is not an error; these
/// cover attempts to resolve one that cannot be resolved.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConflictError {
    #[error("conflict not found: {conflict_id}")]
    NotFound { conflict_id: String },

    #[error("conflict {conflict_id} is already {status}")]
    NotPending { conflict_id: String, status: String },

    #[error("conflict {conflict_id}: local {entity_type} {entity_id} no longer exists")]
    LocalDataMissing {
        conflict_id: String,
        entity_type: String,
        entity_id: String,
    },

    #[error("merge failed for conflict {conflict_id}: {reason}")]
    MergeFailed { conflict_id: String, reason: String },
}
