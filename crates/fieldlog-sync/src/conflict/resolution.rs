//! Field merging for use-remote and manual resolutions.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use fieldlog_core::errors::{ConflictError, FieldlogError, FieldlogResult};
use fieldlog_core::models::{EntityData, VersionConflict};
use fieldlog_core::validation::{validate_arrangement, validate_completion};

/// Shallow overwrite: every top-level field of `overlay` replaces the one in
/// `base`. Non-object overlays change nothing.
pub fn merge_over(base: &Value, overlay: &Value) -> Value {
    let mut merged = base.clone();
    if let (Some(target), Some(fields)) = (merged.as_object_mut(), overlay.as_object()) {
        for (key, value) in fields {
            target.insert(key.clone(), value.clone());
        }
    }
    merged
}

fn merge_failed(conflict: &VersionConflict, reason: impl ToString) -> FieldlogError {
    ConflictError::MergeFailed {
        conflict_id: conflict.id.clone(),
        reason: reason.to_string(),
    }
    .into()
}

fn remerge<T: Serialize + DeserializeOwned>(
    conflict: &VersionConflict,
    live: &T,
    overlay: &Value,
) -> FieldlogResult<T> {
    let base = serde_json::to_value(live)?;
    serde_json::from_value(merge_over(&base, overlay)).map_err(|e| merge_failed(conflict, e))
}

/// The entity a resolution produces: `overlay` merged over the live local
/// entity, at a version above both the detected and the live version.
/// Identity fields cannot be changed by the overlay.
pub fn resolved_entity(
    conflict: &VersionConflict,
    live: &EntityData,
    overlay: &Value,
) -> FieldlogResult<(EntityData, u64)> {
    let version = conflict.current_version.max(live.version().unwrap_or(0)) + 1;
    let entity = match live {
        EntityData::Completion(local) => {
            let mut merged = remerge(conflict, local, overlay)?;
            merged.id = local.id.clone();
            merged.version = version;
            validate_completion(&merged).map_err(|e| merge_failed(conflict, e))?;
            EntityData::Completion(merged)
        }
        EntityData::Arrangement(local) => {
            let mut merged = remerge(conflict, local, overlay)?;
            merged.id = local.id.clone();
            merged.version = version;
            validate_arrangement(&merged).map_err(|e| merge_failed(conflict, e))?;
            EntityData::Arrangement(merged)
        }
        EntityData::Session(_) => {
            return Err(merge_failed(conflict, "sessions are not versioned"));
        }
    };
    Ok((entity, version))
}
