//! Raw SQL operations for the tracked_changes table.

use rusqlite::{params, Connection};

use fieldlog_core::errors::FieldlogResult;
use fieldlog_core::models::TrackedChange;

use crate::{from_millis, to_storage_err};

pub fn insert_change(conn: &Connection, change: &TrackedChange) -> FieldlogResult<()> {
    conn.execute(
        "INSERT INTO tracked_changes
             (entity, entity_id, operation_id, device_id, timestamp, checksum, tracked_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            change.entity,
            change.entity_id,
            change.operation_id,
            change.device_id,
            change.timestamp.timestamp_millis(),
            change.checksum,
            change.tracked_at.timestamp_millis(),
        ],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}

/// Changes to one entity tracked at or after `since_ms`, newest first.
pub fn changes_for_entity(
    conn: &Connection,
    entity: &str,
    entity_id: &str,
    since_ms: i64,
) -> FieldlogResult<Vec<TrackedChange>> {
    let mut stmt = conn
        .prepare(
            "SELECT entity, entity_id, operation_id, device_id, timestamp, checksum, tracked_at
             FROM tracked_changes
             WHERE entity = ?1 AND entity_id = ?2 AND tracked_at >= ?3
             ORDER BY tracked_at DESC, id DESC",
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    let rows = stmt
        .query_map(params![entity, entity_id, since_ms], |row| {
            Ok(TrackedChange {
                entity: row.get(0)?,
                entity_id: row.get(1)?,
                operation_id: row.get(2)?,
                device_id: row.get(3)?,
                timestamp: from_millis(row.get(4)?)?,
                checksum: row.get(5)?,
                tracked_at: from_millis(row.get(6)?)?,
            })
        })
        .map_err(|e| to_storage_err(e.to_string()))?;
    let mut changes = Vec::new();
    for row in rows {
        changes.push(row.map_err(|e| to_storage_err(e.to_string()))?);
    }
    Ok(changes)
}

pub fn delete_tracked_before(conn: &Connection, cutoff_ms: i64) -> FieldlogResult<usize> {
    conn.execute(
        "DELETE FROM tracked_changes WHERE tracked_at < ?1",
        params![cutoff_ms],
    )
    .map_err(|e| to_storage_err(e.to_string()))
}

pub fn count_changes(conn: &Connection) -> FieldlogResult<usize> {
    conn.query_row("SELECT COUNT(*) FROM tracked_changes", [], |row| {
        row.get::<_, i64>(0)
    })
    .map(|n| n as usize)
    .map_err(|e| to_storage_err(e.to_string()))
}
