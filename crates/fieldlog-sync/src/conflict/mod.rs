//! Conflict manager: the durable record of detected version conflicts and
//! their `pending → resolved | dismissed` lifecycle.
//!
//! A conflict is not an error. Errors here are attempts to resolve one that
//! is gone, already closed, or whose local entity has since been deleted.

pub mod detection;
pub mod resolution;

use std::sync::Arc;

use chrono::Duration;
use rusqlite::Connection;
use tracing::{info, warn};

use fieldlog_core::config::ConflictConfig;
use fieldlog_core::errors::{ConflictError, FieldlogResult};
use fieldlog_core::models::{
    AppState, ConflictEntityType, ConflictResolution, ConflictStatus, EntityData, VersionConflict,
};
use fieldlog_core::Clock;
use fieldlog_storage::queries::conflict_ops;
use fieldlog_storage::StorageEngine;

pub use detection::{detect, settled_by, Detection, Settled};
pub use resolution::{merge_over, resolved_entity};

pub struct ConflictManager {
    storage: Arc<StorageEngine>,
    clock: Arc<dyn Clock>,
    config: ConflictConfig,
}

impl ConflictManager {
    pub fn new(storage: Arc<StorageEngine>, clock: Arc<dyn Clock>, config: ConflictConfig) -> Self {
        Self {
            storage,
            clock,
            config,
        }
    }

    /// Park a detected conflict. A second detection for the same remote
    /// operation is ignored; returns whether a new record was written.
    pub fn record_in(conn: &Connection, conflict: &VersionConflict) -> FieldlogResult<bool> {
        let inserted = conflict_ops::insert_conflict(conn, conflict)?;
        if inserted {
            warn!(
                conflict_id = %conflict.id,
                entity_type = conflict.entity_type.as_str(),
                entity_id = %conflict.entity_id,
                current_version = conflict.current_version,
                expected_version = conflict.expected_version,
                "version conflict detected"
            );
        }
        Ok(inserted)
    }

    /// Close pending conflicts superseded by a resolution made elsewhere.
    pub fn settle_in(conn: &Connection, settled: &Settled, now_ms: i64) -> FieldlogResult<usize> {
        let closed = conflict_ops::resolve_pending_below(
            conn,
            settled.entity_type,
            &settled.entity_id,
            settled.below_version,
            settled.resolution,
            now_ms,
        )?;
        if closed > 0 {
            info!(
                entity_id = %settled.entity_id,
                resulting_version = settled.below_version,
                closed,
                "pending conflicts settled by a remote resolution"
            );
        }
        Ok(closed)
    }

    pub async fn pending(&self) -> FieldlogResult<Vec<VersionConflict>> {
        self.storage
            .with_conn(|conn| conflict_ops::list_by_status(conn, ConflictStatus::Pending))
            .await
    }

    /// Resolved and dismissed conflicts not yet purged.
    pub async fn resolved(&self) -> FieldlogResult<Vec<VersionConflict>> {
        self.storage.with_conn(conflict_ops::list_terminal).await
    }

    pub async fn get(&self, id: &str) -> FieldlogResult<Option<VersionConflict>> {
        self.storage
            .with_conn(|conn| conflict_ops::get_conflict(conn, id))
            .await
    }

    /// Load a conflict and check it can still be resolved against `state`.
    pub async fn resolvable(
        &self,
        id: &str,
        state: &AppState,
    ) -> FieldlogResult<(VersionConflict, EntityData)> {
        let conflict = self.get(id).await?.ok_or_else(|| ConflictError::NotFound {
            conflict_id: id.to_string(),
        })?;
        let live = can_resolve(&conflict, state)?;
        Ok((conflict, live))
    }

    /// Close a pending conflict on the caller's transaction.
    pub fn mark_in(
        conn: &Connection,
        conflict: &VersionConflict,
        status: ConflictStatus,
        resolution: Option<ConflictResolution>,
        now_ms: i64,
    ) -> FieldlogResult<()> {
        if !conflict_ops::mark_terminal(conn, &conflict.id, status, resolution, now_ms)? {
            return Err(ConflictError::NotPending {
                conflict_id: conflict.id.clone(),
                status: "closed".to_string(),
            }
            .into());
        }
        info!(
            conflict_id = %conflict.id,
            status = status.as_str(),
            resolution = resolution.map(|r| r.as_str()),
            "conflict closed"
        );
        Ok(())
    }

    pub async fn mark(
        &self,
        conflict: &VersionConflict,
        status: ConflictStatus,
        resolution: Option<ConflictResolution>,
    ) -> FieldlogResult<()> {
        let now_ms = self.clock.now_ms();
        self.storage
            .with_transaction(|conn| Self::mark_in(conn, conflict, status, resolution, now_ms))
            .await
    }

    /// Dismiss pending conflicts older than the auto-dismiss window.
    pub async fn auto_dismiss(&self) -> FieldlogResult<usize> {
        let now = self.clock.now();
        let cutoff = now - Duration::days(self.config.auto_dismiss_days);
        let dismissed = self
            .storage
            .with_conn(|conn| {
                conflict_ops::dismiss_pending_before(
                    conn,
                    cutoff.timestamp_millis(),
                    now.timestamp_millis(),
                )
            })
            .await?;
        if dismissed > 0 {
            info!(dismissed, "auto-dismissed stale conflicts");
        }
        Ok(dismissed)
    }

    /// Purge closed conflicts older than the cleanup window.
    pub async fn cleanup(&self) -> FieldlogResult<usize> {
        let cutoff = self.clock.now() - Duration::hours(self.config.cleanup_hours);
        self.storage
            .with_conn(|conn| conflict_ops::delete_terminal_before(conn, cutoff.timestamp_millis()))
            .await
    }
}

fn live_entity(
    state: &AppState,
    entity_type: ConflictEntityType,
    id: &str,
) -> Option<EntityData> {
    match entity_type {
        ConflictEntityType::Completion => state.completion(id).cloned().map(EntityData::Completion),
        ConflictEntityType::Arrangement => {
            state.arrangement(id).cloned().map(EntityData::Arrangement)
        }
    }
}

/// A conflict can be resolved only while pending and while its local
/// entity still exists. Returns the live local entity.
pub fn can_resolve(conflict: &VersionConflict, state: &AppState) -> FieldlogResult<EntityData> {
    if !conflict.is_pending() {
        return Err(ConflictError::NotPending {
            conflict_id: conflict.id.clone(),
            status: conflict.status.as_str().to_string(),
        }
        .into());
    }
    let live = live_entity(state, conflict.entity_type, &conflict.entity_id)
        .filter(|_| conflict.local_data.is_some());
    live.ok_or_else(|| {
        ConflictError::LocalDataMissing {
            conflict_id: conflict.id.clone(),
            entity_type: conflict.entity_type.as_str().to_string(),
            entity_id: conflict.entity_id.clone(),
        }
        .into()
    })
}
