//! Raw SQL operations for the operation_log table: every operation this
//! device produced or absorbed, in the order it was recorded.

use rusqlite::{params, Connection};
use tracing::{debug, instrument};

use fieldlog_core::errors::FieldlogResult;
use fieldlog_core::models::Operation;

use crate::{from_json, to_storage_err};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationOrigin {
    Local,
    Remote,
}

impl OperationOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationOrigin::Local => "local",
            OperationOrigin::Remote => "remote",
        }
    }
}

/// Record an operation. Returns false when it was already recorded.
#[instrument(skip(conn, operation), fields(operation_id = %operation.id))]
pub fn insert_operation(
    conn: &Connection,
    operation: &Operation,
    origin: OperationOrigin,
    recorded_at_ms: i64,
) -> FieldlogResult<bool> {
    let json = serde_json::to_string(operation)?;
    let inserted = conn
        .execute(
            "INSERT OR IGNORE INTO operation_log
                 (id, client_id, sequence, op_type, operation, origin, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                operation.id,
                operation.client_id,
                operation.sequence as i64,
                operation.kind.name(),
                json,
                origin.as_str(),
                recorded_at_ms,
            ],
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    debug!(inserted = inserted > 0, origin = origin.as_str(), "recorded operation");
    Ok(inserted > 0)
}

pub fn contains_operation(conn: &Connection, id: &str) -> FieldlogResult<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM operation_log WHERE id = ?1)",
        params![id],
        |row| row.get(0),
    )
    .map_err(|e| to_storage_err(e.to_string()))
}

/// Operations in recording order, optionally filtered by origin.
pub fn list_operations(
    conn: &Connection,
    origin: Option<OperationOrigin>,
) -> FieldlogResult<Vec<Operation>> {
    let mut stmt = conn
        .prepare(
            "SELECT operation FROM operation_log
             WHERE ?1 IS NULL OR origin = ?1
             ORDER BY recorded_at ASC, rowid ASC",
        )
        .map_err(|e| to_storage_err(e.to_string()))?;

    let rows = stmt
        .query_map(params![origin.map(|o| o.as_str())], |row| {
            let text: String = row.get(0)?;
            from_json::<Operation>(0, &text)
        })
        .map_err(|e| to_storage_err(e.to_string()))?;

    let mut operations = Vec::new();
    for row in rows {
        operations.push(row.map_err(|e| to_storage_err(e.to_string()))?);
    }
    Ok(operations)
}

/// Highest recorded sequence for a device.
pub fn max_sequence(conn: &Connection, client_id: &str) -> FieldlogResult<Option<u64>> {
    let max: Option<i64> = conn
        .query_row(
            "SELECT MAX(sequence) FROM operation_log WHERE client_id = ?1",
            params![client_id],
            |row| row.get(0),
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(max.map(|m| m as u64))
}
