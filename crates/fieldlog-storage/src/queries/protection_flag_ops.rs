//! Raw SQL operations for the protection_flags table.

use rusqlite::{params, Connection, OptionalExtension};

use fieldlog_core::errors::FieldlogResult;

use crate::to_storage_err;

/// A persisted flag: when it was set and for how long it protects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoredFlag {
    pub set_time_ms: i64,
    pub timeout_ms: u64,
}

pub fn upsert_flag(conn: &Connection, key: &str, flag: StoredFlag) -> FieldlogResult<()> {
    conn.execute(
        "INSERT INTO protection_flags (key, set_time, timeout_ms) VALUES (?1, ?2, ?3)
         ON CONFLICT(key) DO UPDATE SET set_time = excluded.set_time,
                                        timeout_ms = excluded.timeout_ms",
        params![key, flag.set_time_ms, flag.timeout_ms as i64],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}

pub fn get_flag(conn: &Connection, key: &str) -> FieldlogResult<Option<StoredFlag>> {
    conn.query_row(
        "SELECT set_time, timeout_ms FROM protection_flags WHERE key = ?1",
        params![key],
        |row| {
            Ok(StoredFlag {
                set_time_ms: row.get(0)?,
                timeout_ms: row.get::<_, i64>(1)? as u64,
            })
        },
    )
    .optional()
    .map_err(|e| to_storage_err(e.to_string()))
}

/// Delete a flag, but only if it is still the one that was read.
/// A flag re-set in between is left alone.
pub fn delete_flag_if(conn: &Connection, key: &str, expected: StoredFlag) -> FieldlogResult<bool> {
    let changed = conn
        .execute(
            "DELETE FROM protection_flags WHERE key = ?1 AND set_time = ?2 AND timeout_ms = ?3",
            params![key, expected.set_time_ms, expected.timeout_ms as i64],
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(changed > 0)
}

pub fn delete_flag(conn: &Connection, key: &str) -> FieldlogResult<bool> {
    let changed = conn
        .execute("DELETE FROM protection_flags WHERE key = ?1", params![key])
        .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(changed > 0)
}

pub fn list_flags(conn: &Connection) -> FieldlogResult<Vec<(String, StoredFlag)>> {
    let mut stmt = conn
        .prepare("SELECT key, set_time, timeout_ms FROM protection_flags ORDER BY key")
        .map_err(|e| to_storage_err(e.to_string()))?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                StoredFlag {
                    set_time_ms: row.get(1)?,
                    timeout_ms: row.get::<_, i64>(2)? as u64,
                },
            ))
        })
        .map_err(|e| to_storage_err(e.to_string()))?;
    let mut flags = Vec::new();
    for row in rows {
        flags.push(row.map_err(|e| to_storage_err(e.to_string()))?);
    }
    Ok(flags)
}
