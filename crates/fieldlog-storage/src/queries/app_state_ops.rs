//! Raw SQL operations for the single-row app_state table and its backups.

use rusqlite::{params, Connection, OptionalExtension};

use fieldlog_core::errors::FieldlogResult;

use crate::to_storage_err;

/// The persisted state blob as stored, not yet parsed.
#[derive(Debug, Clone)]
pub struct RawAppState {
    pub state: String,
    pub schema_version: u32,
}

pub fn load_state(conn: &Connection) -> FieldlogResult<Option<RawAppState>> {
    conn.query_row(
        "SELECT state, schema_version FROM app_state WHERE id = 1",
        [],
        |row| {
            Ok(RawAppState {
                state: row.get(0)?,
                schema_version: row.get(1)?,
            })
        },
    )
    .optional()
    .map_err(|e| to_storage_err(e.to_string()))
}

pub fn save_state(
    conn: &Connection,
    state_json: &str,
    schema_version: u32,
    now_ms: i64,
) -> FieldlogResult<()> {
    conn.execute(
        "INSERT INTO app_state (id, state, schema_version, updated_at) VALUES (1, ?1, ?2, ?3)
         ON CONFLICT(id) DO UPDATE SET state = excluded.state,
                                       schema_version = excluded.schema_version,
                                       updated_at = excluded.updated_at",
        params![state_json, schema_version, now_ms],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}

/// Keep an unreadable state blob before it is replaced.
pub fn insert_backup(conn: &Connection, raw: &str, reason: &str, now_ms: i64) -> FieldlogResult<i64> {
    conn.execute(
        "INSERT INTO app_state_backups (raw, reason, created_at) VALUES (?1, ?2, ?3)",
        params![raw, reason, now_ms],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(conn.last_insert_rowid())
}

pub fn count_backups(conn: &Connection) -> FieldlogResult<usize> {
    conn.query_row("SELECT COUNT(*) FROM app_state_backups", [], |row| {
        row.get::<_, i64>(0)
    })
    .map(|n| n as usize)
    .map_err(|e| to_storage_err(e.to_string()))
}
