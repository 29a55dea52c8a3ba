//! Operation log: device identity, sequence allocation, and the record of
//! every operation this device produced or absorbed.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;
use tracing::info;
use uuid::Uuid;

use fieldlog_core::errors::{FieldlogError, FieldlogResult, StorageError};
use fieldlog_core::models::{Operation, OperationKind};
use fieldlog_storage::queries::device_meta_ops::{self, CLIENT_ID_KEY, PULL_WATERMARK_KEY};
use fieldlog_storage::queries::operation_log_ops::{self, OperationOrigin};
use fieldlog_storage::StorageEngine;

pub struct OperationLog {
    storage: Arc<StorageEngine>,
    client_id: String,
}

impl OperationLog {
    /// Load the persisted device identity, generating one on first run.
    pub async fn open(storage: Arc<StorageEngine>) -> FieldlogResult<Self> {
        let candidate = Uuid::new_v4().to_string();
        let client_id = storage
            .with_conn(|conn| device_meta_ops::get_or_insert_meta(conn, CLIENT_ID_KEY, &candidate))
            .await?;
        if client_id == candidate {
            info!(client_id = %client_id, "generated device identity");
        }
        Ok(Self { storage, client_id })
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Stamp a new operation with this device's id and next sequence.
    /// Runs on the caller's transaction; nothing is recorded in the log yet.
    pub fn create_in(
        &self,
        conn: &Connection,
        id: String,
        kind: OperationKind,
        at: DateTime<Utc>,
    ) -> FieldlogResult<Operation> {
        let sequence = device_meta_ops::next_sequence(conn)?;
        Ok(Operation {
            id,
            kind,
            timestamp: at,
            client_id: self.client_id.clone(),
            sequence,
        })
    }

    /// Record an operation produced on this device.
    pub fn record_local_in(
        conn: &Connection,
        operation: &Operation,
        at: DateTime<Utc>,
    ) -> FieldlogResult<bool> {
        operation_log_ops::insert_operation(
            conn,
            operation,
            OperationOrigin::Local,
            at.timestamp_millis(),
        )
    }

    /// Record an operation absorbed from the remote store.
    pub fn record_remote_in(
        conn: &Connection,
        operation: &Operation,
        at: DateTime<Utc>,
    ) -> FieldlogResult<bool> {
        operation_log_ops::insert_operation(
            conn,
            operation,
            OperationOrigin::Remote,
            at.timestamp_millis(),
        )
    }

    pub fn contains_in(conn: &Connection, operation_id: &str) -> FieldlogResult<bool> {
        operation_log_ops::contains_operation(conn, operation_id)
    }

    /// Every recorded operation, in recording order.
    pub async fn history(&self) -> FieldlogResult<Vec<Operation>> {
        self.storage
            .with_conn(|conn| operation_log_ops::list_operations(conn, None))
            .await
    }

    pub async fn local_history(&self) -> FieldlogResult<Vec<Operation>> {
        self.storage
            .with_conn(|conn| operation_log_ops::list_operations(conn, Some(OperationOrigin::Local)))
            .await
    }

    /// Server arrival time of the newest row already merged.
    pub async fn watermark(&self) -> FieldlogResult<Option<DateTime<Utc>>> {
        let raw = self
            .storage
            .with_conn(|conn| device_meta_ops::get_meta(conn, PULL_WATERMARK_KEY))
            .await?;
        raw.map(|text| {
            DateTime::parse_from_rfc3339(&text)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| {
                    FieldlogError::from(StorageError::CorruptionDetected {
                        details: format!("pull watermark {text:?}: {e}"),
                    })
                })
        })
        .transpose()
    }

    pub fn set_watermark_in(conn: &Connection, at: DateTime<Utc>) -> FieldlogResult<()> {
        device_meta_ops::set_meta(
            conn,
            PULL_WATERMARK_KEY,
            &at.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        )
    }
}
