//! Raw SQL operations for the device_meta key/value table.

use rusqlite::{params, Connection, OptionalExtension};

use fieldlog_core::errors::FieldlogResult;

use crate::to_storage_err;

pub const CLIENT_ID_KEY: &str = "client_id";
pub const LAST_SEQUENCE_KEY: &str = "last_sequence";
pub const PULL_WATERMARK_KEY: &str = "pull_watermark";

pub fn get_meta(conn: &Connection, key: &str) -> FieldlogResult<Option<String>> {
    conn.query_row(
        "SELECT value FROM device_meta WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
    .map_err(|e| to_storage_err(e.to_string()))
}

pub fn set_meta(conn: &Connection, key: &str, value: &str) -> FieldlogResult<()> {
    conn.execute(
        "INSERT INTO device_meta (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}

/// Store `value` unless the key already exists. Returns the stored value.
pub fn get_or_insert_meta(conn: &Connection, key: &str, value: &str) -> FieldlogResult<String> {
    conn.execute(
        "INSERT OR IGNORE INTO device_meta (key, value) VALUES (?1, ?2)",
        params![key, value],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    conn.query_row(
        "SELECT value FROM device_meta WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .map_err(|e| to_storage_err(e.to_string()))
}

/// Increment and return the per-device sequence counter. The first call
/// returns 1. Callers run this inside the transaction that records the
/// operation, so a rolled-back append never burns a sequence number.
pub fn next_sequence(conn: &Connection) -> FieldlogResult<u64> {
    let next: i64 = conn
        .query_row(
            "INSERT INTO device_meta (key, value) VALUES (?1, '1')
             ON CONFLICT(key) DO UPDATE SET value = CAST(value AS INTEGER) + 1
             RETURNING CAST(value AS INTEGER)",
            params![LAST_SEQUENCE_KEY],
            |row| row.get(0),
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(next as u64)
}
