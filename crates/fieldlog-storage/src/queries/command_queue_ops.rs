//! Raw SQL operations for the command_queue table.
//!
//! Every state transition is a single conditional statement, so concurrent
//! callers sharing the store never race on a read-modify-write.

use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, instrument};

use fieldlog_core::errors::FieldlogResult;
use fieldlog_core::models::{CommandQueueItem, Operation, QueueStats, QueueStatus};

use crate::{from_json, from_millis, to_storage_err};

const COLUMNS: &str = "id, operation, added_at, status, attempts, last_attempt, error";

fn row_to_item(row: &Row<'_>) -> rusqlite::Result<CommandQueueItem> {
    let operation: String = row.get(1)?;
    let status: String = row.get(3)?;
    let last_attempt: Option<i64> = row.get(5)?;
    Ok(CommandQueueItem {
        id: row.get(0)?,
        operation: from_json::<Operation>(1, &operation)?,
        added_at: from_millis(row.get(2)?)?,
        status: QueueStatus::parse(&status).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                3,
                rusqlite::types::Type::Text,
                format!("unknown queue status {status}").into(),
            )
        })?,
        attempts: row.get::<_, i64>(4)? as u32,
        last_attempt: last_attempt.map(from_millis).transpose()?,
        error: row.get(6)?,
    })
}

fn collect(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> FieldlogResult<Vec<CommandQueueItem>> {
    let mut stmt = conn.prepare(sql).map_err(|e| to_storage_err(e.to_string()))?;
    let rows = stmt
        .query_map(params, row_to_item)
        .map_err(|e| to_storage_err(e.to_string()))?;
    let mut items = Vec::new();
    for row in rows {
        items.push(row.map_err(|e| to_storage_err(e.to_string()))?);
    }
    Ok(items)
}

#[instrument(skip(conn, item), fields(item_id = %item.id, op = item.operation.kind.name()))]
pub fn insert_item(conn: &Connection, item: &CommandQueueItem) -> FieldlogResult<()> {
    let json = serde_json::to_string(&item.operation)?;
    conn.execute(
        "INSERT INTO command_queue (id, operation, added_at, status, attempts, last_attempt, error)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            item.id,
            json,
            item.added_at.timestamp_millis(),
            item.status.as_str(),
            item.attempts as i64,
            item.last_attempt.map(|t| t.timestamp_millis()),
            item.error,
        ],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    debug!("enqueued command");
    Ok(())
}

pub fn get_item(conn: &Connection, id: &str) -> FieldlogResult<Option<CommandQueueItem>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM command_queue WHERE id = ?1"),
        params![id],
        row_to_item,
    )
    .optional()
    .map_err(|e| to_storage_err(e.to_string()))
}

/// Pending items, oldest first. Insertion order breaks `added_at` ties.
pub fn next_pending(conn: &Connection, limit: usize) -> FieldlogResult<Vec<CommandQueueItem>> {
    collect(
        conn,
        &format!(
            "SELECT {COLUMNS} FROM command_queue
             WHERE status = 'pending'
             ORDER BY added_at ASC, rowid ASC
             LIMIT ?1"
        ),
        params![limit as i64],
    )
}

pub fn list_by_status(
    conn: &Connection,
    status: QueueStatus,
) -> FieldlogResult<Vec<CommandQueueItem>> {
    collect(
        conn,
        &format!(
            "SELECT {COLUMNS} FROM command_queue
             WHERE status = ?1
             ORDER BY added_at ASC, rowid ASC"
        ),
        params![status.as_str()],
    )
}

/// Claim a pending item. Returns false if it was not pending.
pub fn mark_processing(conn: &Connection, id: &str, now_ms: i64) -> FieldlogResult<bool> {
    let changed = conn
        .execute(
            "UPDATE command_queue
             SET status = 'processing', attempts = attempts + 1, last_attempt = ?2, error = NULL
             WHERE id = ?1 AND status = 'pending'",
            params![id, now_ms],
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(changed > 0)
}

/// Confirmed submission: the item is removed.
pub fn mark_completed(conn: &Connection, id: &str) -> FieldlogResult<bool> {
    let changed = conn
        .execute("DELETE FROM command_queue WHERE id = ?1", params![id])
        .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(changed > 0)
}

pub fn mark_failed(conn: &Connection, id: &str, error: &str) -> FieldlogResult<bool> {
    let changed = conn
        .execute(
            "UPDATE command_queue SET status = 'failed', error = ?2 WHERE id = ?1",
            params![id, error],
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(changed > 0)
}

pub fn reset_to_pending(conn: &Connection, id: &str) -> FieldlogResult<bool> {
    let changed = conn
        .execute(
            "UPDATE command_queue SET status = 'pending'
             WHERE id = ?1 AND status IN ('failed', 'processing')",
            params![id],
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(changed > 0)
}

/// Return items stranded in `processing` (e.g. by a crash) to `pending`.
pub fn recover_processing(conn: &Connection) -> FieldlogResult<usize> {
    conn.execute(
        "UPDATE command_queue SET status = 'pending' WHERE status = 'processing'",
        [],
    )
    .map_err(|e| to_storage_err(e.to_string()))
}

/// Reset failed items that still have attempts left.
pub fn reset_failed_below(conn: &Connection, max_attempts: u32) -> FieldlogResult<usize> {
    conn.execute(
        "UPDATE command_queue SET status = 'pending'
         WHERE status = 'failed' AND attempts < ?1",
        params![max_attempts as i64],
    )
    .map_err(|e| to_storage_err(e.to_string()))
}

/// Delete every item added before `cutoff_ms`, whatever its status.
pub fn delete_added_before(conn: &Connection, cutoff_ms: i64) -> FieldlogResult<usize> {
    conn.execute(
        "DELETE FROM command_queue WHERE added_at < ?1",
        params![cutoff_ms],
    )
    .map_err(|e| to_storage_err(e.to_string()))
}

pub fn count_by_status(conn: &Connection) -> FieldlogResult<QueueStats> {
    let mut stmt = conn
        .prepare("SELECT status, COUNT(*) FROM command_queue GROUP BY status")
        .map_err(|e| to_storage_err(e.to_string()))?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
        .map_err(|e| to_storage_err(e.to_string()))?;

    let mut stats = QueueStats::default();
    for row in rows {
        let (status, count) = row.map_err(|e| to_storage_err(e.to_string()))?;
        match QueueStatus::parse(&status) {
            Some(QueueStatus::Pending) => stats.pending = count as usize,
            Some(QueueStatus::Processing) => stats.processing = count as usize,
            Some(QueueStatus::Failed) => stats.failed = count as usize,
            Some(QueueStatus::Completed) | None => {}
        }
    }
    Ok(stats)
}
