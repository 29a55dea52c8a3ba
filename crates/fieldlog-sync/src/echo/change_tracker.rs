//! Remembers this device's confirmed writes for a short retention window.

use std::sync::Arc;

use chrono::Duration;
use rusqlite::Connection;
use tracing::debug;

use fieldlog_core::checksum::content_checksum;
use fieldlog_core::errors::FieldlogResult;
use fieldlog_core::models::{Operation, SubmitReceipt, TrackedChange};
use fieldlog_core::Clock;
use fieldlog_storage::queries::tracked_change_ops;
use fieldlog_storage::StorageEngine;

pub struct ChangeTracker {
    storage: Arc<StorageEngine>,
    clock: Arc<dyn Clock>,
    retention_ms: i64,
}

impl ChangeTracker {
    pub fn new(storage: Arc<StorageEngine>, clock: Arc<dyn Clock>, retention_ms: i64) -> Self {
        Self {
            storage,
            clock,
            retention_ms,
        }
    }

    /// Build the record for a confirmed submission.
    pub fn change_for(&self, operation: &Operation, receipt: &SubmitReceipt) -> FieldlogResult<TrackedChange> {
        Ok(TrackedChange {
            entity: operation.kind.entity_name().to_string(),
            entity_id: operation.kind.entity_id(),
            operation_id: operation.id.clone(),
            device_id: operation.client_id.clone(),
            timestamp: receipt.server_timestamp,
            checksum: content_checksum(&operation.kind)?,
            tracked_at: self.clock.now(),
        })
    }

    pub fn track_in(conn: &Connection, change: &TrackedChange) -> FieldlogResult<()> {
        tracked_change_ops::insert_change(conn, change)?;
        debug!(
            entity = %change.entity,
            entity_id = %change.entity_id,
            operation_id = %change.operation_id,
            "tracked outgoing change"
        );
        Ok(())
    }

    pub async fn track(&self, operation: &Operation, receipt: &SubmitReceipt) -> FieldlogResult<()> {
        let change = self.change_for(operation, receipt)?;
        self.storage
            .with_conn(|conn| Self::track_in(conn, &change))
            .await
    }

    /// Changes to one entity still inside the retention window.
    pub async fn recent(&self, entity: &str, entity_id: &str) -> FieldlogResult<Vec<TrackedChange>> {
        let since = self.clock.now() - Duration::milliseconds(self.retention_ms);
        self.storage
            .with_conn(|conn| {
                tracked_change_ops::changes_for_entity(
                    conn,
                    entity,
                    entity_id,
                    since.timestamp_millis(),
                )
            })
            .await
    }

    /// Drop changes past the retention window.
    pub async fn prune(&self) -> FieldlogResult<usize> {
        let cutoff = self.clock.now() - Duration::milliseconds(self.retention_ms);
        self.storage
            .with_conn(|conn| tracked_change_ops::delete_tracked_before(conn, cutoff.timestamp_millis()))
            .await
    }
}
