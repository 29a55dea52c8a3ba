//! Conflict resolution actions exposed to the UI.

use serde_json::{Map, Value};
use uuid::Uuid;

use fieldlog_core::errors::{ConflictError, FieldlogError, FieldlogResult};
use fieldlog_core::models::{
    ConflictResolution, ConflictStatus, EntityData, OperationKind, UpdateOperation,
    VersionConflict,
};
use fieldlog_core::reducer::{self, Applied};
use fieldlog_core::traits::RemoteStore;

use super::SyncEngine;
use crate::atomic::{AtomicOutcome, AtomicRequest};
use crate::conflict::{can_resolve, resolved_entity};
use crate::optimistic::OptimisticIntent;

impl<R: RemoteStore> SyncEngine<R> {
    pub async fn conflict(&self, id: &str) -> FieldlogResult<Option<VersionConflict>> {
        self.conflicts.get(id).await
    }

    /// Local data wins. Nothing but the conflict record changes.
    pub async fn resolve_keep_local(&self, conflict_id: &str) -> FieldlogResult<()> {
        let _serial = self.resolution_lock.lock().await;
        let state = self.state.snapshot().await;
        let (conflict, _) = self.conflicts.resolvable(conflict_id, &state).await?;
        self.conflicts
            .mark(
                &conflict,
                ConflictStatus::Resolved,
                Some(ConflictResolution::KeepLocal),
            )
            .await
    }

    /// Merge the remote fields over the local entity.
    pub async fn resolve_use_remote(&self, conflict_id: &str) -> FieldlogResult<AtomicOutcome> {
        let _serial = self.resolution_lock.lock().await;
        let state = self.state.snapshot().await;
        let (conflict, live) = self.conflicts.resolvable(conflict_id, &state).await?;
        let overlay = conflict.remote_data.clone();
        self.apply_resolution(conflict, live, &overlay, ConflictResolution::UseRemote)
            .await
    }

    /// Merge caller-chosen fields over the local entity.
    pub async fn resolve_manual(
        &self,
        conflict_id: &str,
        fields: Map<String, Value>,
    ) -> FieldlogResult<AtomicOutcome> {
        let _serial = self.resolution_lock.lock().await;
        let state = self.state.snapshot().await;
        let (conflict, live) = self.conflicts.resolvable(conflict_id, &state).await?;
        self.apply_resolution(conflict, live, &Value::Object(fields), ConflictResolution::Manual)
            .await
    }

    /// Close without changing data. Allowed even when the local entity is
    /// gone, which is the only way such a conflict can be cleared by hand.
    pub async fn dismiss_conflict(&self, conflict_id: &str) -> FieldlogResult<()> {
        let _serial = self.resolution_lock.lock().await;
        let conflict = self
            .conflicts
            .get(conflict_id)
            .await?
            .ok_or_else(|| ConflictError::NotFound {
                conflict_id: conflict_id.to_string(),
            })?;
        if !conflict.is_pending() {
            return Err(ConflictError::NotPending {
                conflict_id: conflict.id.clone(),
                status: conflict.status.as_str().to_string(),
            }
            .into());
        }
        self.conflicts
            .mark(&conflict, ConflictStatus::Dismissed, None)
            .await
    }

    /// Write the merged entity straight into confirmed state and submit a
    /// `ConflictResolve` record for other devices. The record never goes
    /// through conflict detection, so resolving cannot raise a new conflict.
    async fn apply_resolution(
        &self,
        conflict: VersionConflict,
        live: EntityData,
        overlay: &Value,
        resolution: ConflictResolution,
    ) -> FieldlogResult<AtomicOutcome> {
        let (resulting, resulting_version) = resolved_entity(&conflict, &live, overlay)?;
        let kind = OperationKind::ConflictResolve {
            conflict_id: conflict.id.clone(),
            resolution,
            resulting_version,
            resulting: resulting.clone(),
        };
        let at = self.clock.now();
        let request = AtomicRequest {
            operation_id: Uuid::new_v4().to_string(),
            at,
            kind: kind.clone(),
            intent: Some(OptimisticIntent {
                operation: UpdateOperation::Update,
                previous: Some(live),
                data: resulting,
            }),
            rollback_on_failure: false,
        };
        let settings = self.settings;
        let outcome = self
            .atomic
            .execute(request, |state| {
                // State may have moved since the snapshot was checked.
                can_resolve(&conflict, state)?;
                match reducer::apply(state, &kind, at, &settings)? {
                    Applied::Applied => Ok(()),
                    other => Err(ConflictError::MergeFailed {
                        conflict_id: conflict.id.clone(),
                        reason: format!("local entity moved past the resolution ({other:?})"),
                    }
                    .into()),
                }
            })
            .await;

        if !outcome.committed() {
            return Err(outcome.error.unwrap_or_else(|| {
                FieldlogError::from(ConflictError::MergeFailed {
                    conflict_id: conflict.id.clone(),
                    reason: "resolution was not applied".to_string(),
                })
            }));
        }
        self.conflicts
            .mark(&conflict, ConflictStatus::Resolved, Some(resolution))
            .await?;
        Ok(outcome)
    }
}
