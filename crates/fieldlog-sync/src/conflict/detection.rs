//! Version checks for inbound operations.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use fieldlog_core::errors::FieldlogResult;
use fieldlog_core::models::{
    AppState, ConflictEntityType, ConflictResolution, ConflictStatus, EntityData, Operation,
    OperationKind, VersionConflict,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Detection {
    /// Fold the operation into local state.
    Apply,
    /// Local state already holds exactly this entity.
    AlreadyApplied,
    /// Park for resolution; local state is left alone.
    Conflict(Box<VersionConflict>),
}

fn local_entity(
    state: &AppState,
    entity_type: ConflictEntityType,
    id: &str,
) -> FieldlogResult<Option<(serde_json::Value, u64)>> {
    Ok(match entity_type {
        ConflictEntityType::Completion => match state.completion(id) {
            Some(c) => Some((serde_json::to_value(c)?, c.version)),
            None => None,
        },
        ConflictEntityType::Arrangement => match state.arrangement(id) {
            Some(a) => Some((serde_json::to_value(a)?, a.version)),
            None => None,
        },
    })
}

/// What the remote side wrote: the whole entity for creates, the patch for
/// updates.
fn remote_data(kind: &OperationKind) -> FieldlogResult<serde_json::Value> {
    Ok(match kind {
        OperationKind::CompletionCreate { completion } => serde_json::to_value(completion)?,
        OperationKind::ArrangementCreate { arrangement } => serde_json::to_value(arrangement)?,
        OperationKind::CompletionUpdate { changes, .. } => serde_json::to_value(changes)?,
        OperationKind::ArrangementUpdate { changes, .. } => serde_json::to_value(changes)?,
        _ => serde_json::Value::Null,
    })
}

fn same_as_local(kind: &OperationKind, state: &AppState) -> bool {
    match kind {
        OperationKind::CompletionCreate { completion } => state
            .completion(&completion.id)
            .is_some_and(|local| local.same_content(completion)),
        OperationKind::ArrangementCreate { arrangement } => state
            .arrangement(&arrangement.id)
            .is_some_and(|local| local.same_content(arrangement)),
        _ => false,
    }
}

/// Compare an inbound operation's expected version with the local entity.
///
/// A create expects the entity not to exist. An update expects the local
/// version it was written against. Updates to entities this device does not
/// have are applied (the reducer ignores them).
pub fn detect(
    operation: &Operation,
    state: &AppState,
    now: DateTime<Utc>,
) -> FieldlogResult<Detection> {
    let Some(target) = operation.target() else {
        return Ok(Detection::Apply);
    };
    let Some((local_data, current_version)) =
        local_entity(state, target.entity_type, &target.entity_id)?
    else {
        return Ok(Detection::Apply);
    };

    let is_create = target.expected_version == 0;
    if is_create && same_as_local(&operation.kind, state) {
        return Ok(Detection::AlreadyApplied);
    }
    if !is_create && current_version == target.expected_version {
        return Ok(Detection::Apply);
    }

    Ok(Detection::Conflict(Box::new(VersionConflict {
        id: Uuid::new_v4().to_string(),
        entity_type: target.entity_type,
        entity_id: target.entity_id,
        local_data: Some(local_data),
        remote_data: remote_data(&operation.kind)?,
        current_version,
        expected_version: target.expected_version,
        remote_operation_id: operation.id.clone(),
        remote_client_id: operation.client_id.clone(),
        timestamp: now,
        status: ConflictStatus::Pending,
        resolution: None,
        resolved_at: None,
    })))
}

/// Pending conflicts an inbound resolution closes: those on the same entity
/// raised while the local version was below the one it produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settled {
    pub entity_type: ConflictEntityType,
    pub entity_id: String,
    pub below_version: u64,
    pub resolution: ConflictResolution,
}

pub fn settled_by(kind: &OperationKind) -> Option<Settled> {
    let OperationKind::ConflictResolve {
        resolution,
        resulting_version,
        resulting,
        ..
    } = kind
    else {
        return None;
    };
    let entity_type = match resulting {
        EntityData::Completion(_) => ConflictEntityType::Completion,
        EntityData::Arrangement(_) => ConflictEntityType::Arrangement,
        EntityData::Session(_) => return None,
    };
    Some(Settled {
        entity_type,
        entity_id: resulting.entity_id(),
        below_version: *resulting_version,
        resolution: *resolution,
    })
}

#[cfg(test)]
mod tests {
    use fieldlog_core::models::CompletionPatch;
    use test_fixtures::{base_time, completion, state_with_addresses};

    use super::*;

    fn op(kind: OperationKind) -> Operation {
        Operation {
            id: "op-remote".to_string(),
            kind,
            timestamp: base_time(),
            client_id: "device-b".to_string(),
            sequence: 1,
        }
    }

    fn update(expected_version: u64) -> Operation {
        op(OperationKind::CompletionUpdate {
            id: "c1".to_string(),
            changes: CompletionPatch {
                amount: Some(Some(25.0)),
                ..CompletionPatch::default()
            },
            expected_version,
        })
    }

    #[test]
    fn matching_version_applies() {
        let mut state = state_with_addresses(2);
        state.completions.push(completion("c1", 0, base_time()));
        assert_eq!(detect(&update(1), &state, base_time()).unwrap(), Detection::Apply);
    }

    #[test]
    fn stale_update_is_a_conflict_carrying_the_patch() {
        let mut state = state_with_addresses(2);
        let mut local = completion("c1", 0, base_time());
        local.version = 2;
        state.completions.push(local);

        let Detection::Conflict(conflict) = detect(&update(1), &state, base_time()).unwrap() else {
            panic!("expected a conflict");
        };
        assert_eq!(conflict.current_version, 2);
        assert_eq!(conflict.expected_version, 1);
        assert_eq!(conflict.remote_data, serde_json::json!({"amount": 25.0}));
        assert_eq!(conflict.remote_client_id, "device-b");
        assert!(conflict.is_pending());
    }

    #[test]
    fn creates_compare_content() {
        let mut state = state_with_addresses(2);
        state.completions.push(completion("c1", 0, base_time()));

        let same = op(OperationKind::CompletionCreate {
            completion: completion("c1", 0, base_time()),
        });
        assert_eq!(detect(&same, &state, base_time()).unwrap(), Detection::AlreadyApplied);

        let mut other = completion("c1", 0, base_time());
        other.amount = Some(99.0);
        let differs = op(OperationKind::CompletionCreate { completion: other });
        assert!(matches!(
            detect(&differs, &state, base_time()).unwrap(),
            Detection::Conflict(c) if c.expected_version == 0 && c.current_version == 1
        ));
    }

    #[test]
    fn unknown_entities_and_untargeted_ops_apply() {
        let state = state_with_addresses(2);
        assert_eq!(detect(&update(1), &state, base_time()).unwrap(), Detection::Apply);
        let delete = op(OperationKind::CompletionDelete { id: "c1".to_string() });
        assert_eq!(detect(&delete, &state, base_time()).unwrap(), Detection::Apply);
    }

    #[test]
    fn resolutions_name_the_conflicts_they_settle() {
        let resolve = OperationKind::ConflictResolve {
            conflict_id: "k1".to_string(),
            resolution: ConflictResolution::UseRemote,
            resulting_version: 3,
            resulting: EntityData::Completion(completion("c1", 0, base_time())),
        };
        assert_eq!(
            settled_by(&resolve),
            Some(Settled {
                entity_type: ConflictEntityType::Completion,
                entity_id: "c1".to_string(),
                below_version: 3,
                resolution: ConflictResolution::UseRemote,
            })
        );
        assert_eq!(settled_by(&update(1).kind), None);
    }
}
