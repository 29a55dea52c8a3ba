//! Raw SQL operations for the conflicts table.
//!
//! Status transitions are conditional on `status = 'pending'`: only one
//! caller can move a conflict to a terminal state.

use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, instrument};

use fieldlog_core::errors::FieldlogResult;
use fieldlog_core::models::{
    ConflictEntityType, ConflictResolution, ConflictStatus, VersionConflict,
};

use crate::{from_json, from_millis, to_storage_err};

const COLUMNS: &str = "id, entity_type, entity_id, local_data, remote_data, current_version,
     expected_version, remote_operation_id, remote_client_id, timestamp, status, resolution,
     resolved_at";

fn bad_text(column: usize, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        column,
        rusqlite::types::Type::Text,
        format!("unexpected value {value}").into(),
    )
}

fn row_to_conflict(row: &Row<'_>) -> rusqlite::Result<VersionConflict> {
    let entity_type: String = row.get(1)?;
    let local_data: Option<String> = row.get(3)?;
    let remote_data: String = row.get(4)?;
    let status: String = row.get(10)?;
    let resolution: Option<String> = row.get(11)?;
    let resolved_at: Option<i64> = row.get(12)?;

    Ok(VersionConflict {
        id: row.get(0)?,
        entity_type: ConflictEntityType::parse(&entity_type)
            .ok_or_else(|| bad_text(1, &entity_type))?,
        entity_id: row.get(2)?,
        local_data: local_data.map(|text| from_json(3, &text)).transpose()?,
        remote_data: from_json(4, &remote_data)?,
        current_version: row.get::<_, i64>(5)? as u64,
        expected_version: row.get::<_, i64>(6)? as u64,
        remote_operation_id: row.get(7)?,
        remote_client_id: row.get(8)?,
        timestamp: from_millis(row.get(9)?)?,
        status: ConflictStatus::parse(&status).ok_or_else(|| bad_text(10, &status))?,
        resolution: match resolution {
            Some(r) => Some(ConflictResolution::parse(&r).ok_or_else(|| bad_text(11, &r))?),
            None => None,
        },
        resolved_at: resolved_at.map(from_millis).transpose()?,
    })
}

fn collect(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> FieldlogResult<Vec<VersionConflict>> {
    let mut stmt = conn.prepare(sql).map_err(|e| to_storage_err(e.to_string()))?;
    let rows = stmt
        .query_map(params, row_to_conflict)
        .map_err(|e| to_storage_err(e.to_string()))?;
    let mut conflicts = Vec::new();
    for row in rows {
        conflicts.push(row.map_err(|e| to_storage_err(e.to_string()))?);
    }
    Ok(conflicts)
}

/// Insert a conflict. A second conflict for the same remote operation is
/// ignored; returns whether a row was written.
#[instrument(skip(conn, conflict), fields(conflict_id = %conflict.id, entity_id = %conflict.entity_id))]
pub fn insert_conflict(conn: &Connection, conflict: &VersionConflict) -> FieldlogResult<bool> {
    let local_data = conflict
        .local_data
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    let remote_data = serde_json::to_string(&conflict.remote_data)?;
    let inserted = conn
        .execute(
            "INSERT OR IGNORE INTO conflicts
                 (id, entity_type, entity_id, local_data, remote_data, current_version,
                  expected_version, remote_operation_id, remote_client_id, timestamp, status,
                  resolution, resolved_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                conflict.id,
                conflict.entity_type.as_str(),
                conflict.entity_id,
                local_data,
                remote_data,
                conflict.current_version as i64,
                conflict.expected_version as i64,
                conflict.remote_operation_id,
                conflict.remote_client_id,
                conflict.timestamp.timestamp_millis(),
                conflict.status.as_str(),
                conflict.resolution.map(|r| r.as_str()),
                conflict.resolved_at.map(|t| t.timestamp_millis()),
            ],
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    debug!(inserted = inserted > 0, "stored conflict");
    Ok(inserted > 0)
}

pub fn get_conflict(conn: &Connection, id: &str) -> FieldlogResult<Option<VersionConflict>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM conflicts WHERE id = ?1"),
        params![id],
        row_to_conflict,
    )
    .optional()
    .map_err(|e| to_storage_err(e.to_string()))
}

pub fn list_by_status(
    conn: &Connection,
    status: ConflictStatus,
) -> FieldlogResult<Vec<VersionConflict>> {
    collect(
        conn,
        &format!(
            "SELECT {COLUMNS} FROM conflicts WHERE status = ?1 ORDER BY timestamp ASC, rowid ASC"
        ),
        params![status.as_str()],
    )
}

/// Resolved and dismissed conflicts, most recent first.
pub fn list_terminal(conn: &Connection) -> FieldlogResult<Vec<VersionConflict>> {
    collect(
        conn,
        &format!(
            "SELECT {COLUMNS} FROM conflicts WHERE status != 'pending'
             ORDER BY resolved_at DESC, rowid DESC"
        ),
        [],
    )
}

/// Move a pending conflict to a terminal status. Returns false when the
/// conflict was not pending (or does not exist).
pub fn mark_terminal(
    conn: &Connection,
    id: &str,
    status: ConflictStatus,
    resolution: Option<ConflictResolution>,
    resolved_at_ms: i64,
) -> FieldlogResult<bool> {
    let changed = conn
        .execute(
            "UPDATE conflicts SET status = ?2, resolution = ?3, resolved_at = ?4
             WHERE id = ?1 AND status = 'pending'",
            params![id, status.as_str(), resolution.map(|r| r.as_str()), resolved_at_ms],
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(changed > 0)
}

/// Dismiss pending conflicts detected before `cutoff_ms`.
pub fn dismiss_pending_before(
    conn: &Connection,
    cutoff_ms: i64,
    now_ms: i64,
) -> FieldlogResult<usize> {
    conn.execute(
        "UPDATE conflicts SET status = 'dismissed', resolved_at = ?2
         WHERE status = 'pending' AND timestamp < ?1",
        params![cutoff_ms, now_ms],
    )
    .map_err(|e| to_storage_err(e.to_string()))
}

/// Purge resolved and dismissed conflicts closed before `cutoff_ms`.
pub fn delete_terminal_before(conn: &Connection, cutoff_ms: i64) -> FieldlogResult<usize> {
    conn.execute(
        "DELETE FROM conflicts WHERE status != 'pending' AND resolved_at < ?1",
        params![cutoff_ms],
    )
    .map_err(|e| to_storage_err(e.to_string()))
}

/// Resolve pending conflicts on one entity whose local version was below
/// `below_version`. Used when a resolution made on another device arrives:
/// the entity it produced already supersedes them.
pub fn resolve_pending_below(
    conn: &Connection,
    entity_type: ConflictEntityType,
    entity_id: &str,
    below_version: u64,
    resolution: ConflictResolution,
    resolved_at_ms: i64,
) -> FieldlogResult<usize> {
    conn.execute(
        "UPDATE conflicts SET status = 'resolved', resolution = ?4, resolved_at = ?5
         WHERE status = 'pending' AND entity_type = ?1 AND entity_id = ?2
           AND current_version < ?3",
        params![
            entity_type.as_str(),
            entity_id,
            below_version as i64,
            resolution.as_str(),
            resolved_at_ms,
        ],
    )
    .map_err(|e| to_storage_err(e.to_string()))
}
