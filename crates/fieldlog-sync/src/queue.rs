//! Durable FIFO command queue of operations awaiting submission.
//!
//! Each transition is one conditional write against the store. A failed
//! command stays visible with its error until it is reset or expires;
//! nothing is dropped silently.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use fieldlog_core::config::QueueConfig;
use fieldlog_core::errors::FieldlogResult;
use fieldlog_core::models::{CommandQueueItem, Operation, QueueStats, QueueStatus};
use fieldlog_core::Clock;
use fieldlog_storage::queries::command_queue_ops;
use fieldlog_storage::StorageEngine;

pub struct CommandQueue {
    storage: Arc<StorageEngine>,
    clock: Arc<dyn Clock>,
    config: QueueConfig,
}

impl CommandQueue {
    pub fn new(storage: Arc<StorageEngine>, clock: Arc<dyn Clock>, config: QueueConfig) -> Self {
        Self {
            storage,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Enqueue on the caller's transaction.
    pub fn add_in(
        conn: &Connection,
        operation: &Operation,
        status: QueueStatus,
        at: DateTime<Utc>,
    ) -> FieldlogResult<String> {
        let item = CommandQueueItem {
            id: Uuid::new_v4().to_string(),
            operation: operation.clone(),
            added_at: at,
            status,
            attempts: u32::from(status == QueueStatus::Processing),
            last_attempt: (status == QueueStatus::Processing).then_some(at),
            error: None,
        };
        command_queue_ops::insert_item(conn, &item)?;
        Ok(item.id)
    }

    pub async fn add(&self, operation: &Operation) -> FieldlogResult<String> {
        let now = self.clock.now();
        self.storage
            .with_conn(|conn| Self::add_in(conn, operation, QueueStatus::Pending, now))
            .await
    }

    /// Up to `limit` pending commands, oldest first.
    pub async fn get_next_pending(&self, limit: usize) -> FieldlogResult<Vec<CommandQueueItem>> {
        self.storage
            .with_conn(|conn| command_queue_ops::next_pending(conn, limit))
            .await
    }

    pub async fn get(&self, id: &str) -> FieldlogResult<Option<CommandQueueItem>> {
        self.storage
            .with_conn(|conn| command_queue_ops::get_item(conn, id))
            .await
    }

    /// Claim a pending command. Returns false if another caller claimed it.
    pub async fn mark_processing(&self, id: &str) -> FieldlogResult<bool> {
        let now_ms = self.clock.now_ms();
        self.storage
            .with_conn(|conn| command_queue_ops::mark_processing(conn, id, now_ms))
            .await
    }

    pub async fn mark_completed(&self, id: &str) -> FieldlogResult<bool> {
        self.storage
            .with_conn(|conn| command_queue_ops::mark_completed(conn, id))
            .await
    }

    #[instrument(skip(self))]
    pub async fn mark_failed(&self, id: &str, error: &str) -> FieldlogResult<bool> {
        let changed = self
            .storage
            .with_conn(|conn| command_queue_ops::mark_failed(conn, id, error))
            .await?;
        warn!("queued command failed");
        Ok(changed)
    }

    pub async fn reset_to_pending(&self, id: &str) -> FieldlogResult<bool> {
        self.storage
            .with_conn(|conn| command_queue_ops::reset_to_pending(conn, id))
            .await
    }

    /// Purge commands older than the expiry window, whatever their status.
    pub async fn cleanup_old(&self) -> FieldlogResult<usize> {
        let cutoff = self.clock.now() - Duration::hours(self.config.expiry_hours);
        let removed = self
            .storage
            .with_conn(|conn| command_queue_ops::delete_added_before(conn, cutoff.timestamp_millis()))
            .await?;
        if removed > 0 {
            info!(removed, "expired queued commands");
        }
        Ok(removed)
    }

    /// Return commands stranded in `processing` by an interrupted drain.
    pub async fn recover_stale_processing(&self) -> FieldlogResult<usize> {
        let recovered = self
            .storage
            .with_conn(command_queue_ops::recover_processing)
            .await?;
        if recovered > 0 {
            info!(recovered, "recovered interrupted commands");
        }
        Ok(recovered)
    }

    /// Put failed commands with attempts left back in line.
    pub async fn retry_failed(&self) -> FieldlogResult<usize> {
        let max_attempts = self.config.max_attempts;
        let reset = self
            .storage
            .with_conn(|conn| command_queue_ops::reset_failed_below(conn, max_attempts))
            .await?;
        debug!(reset, "failed commands returned to pending");
        Ok(reset)
    }

    pub async fn failed(&self) -> FieldlogResult<Vec<CommandQueueItem>> {
        self.storage
            .with_conn(|conn| command_queue_ops::list_by_status(conn, QueueStatus::Failed))
            .await
    }

    pub async fn stats(&self) -> FieldlogResult<QueueStats> {
        self.storage
            .with_conn(command_queue_ops::count_by_status)
            .await
    }
}
