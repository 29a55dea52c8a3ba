//! v005: tracked_changes for echo detection.

use rusqlite::Connection;

use fieldlog_core::errors::FieldlogResult;

use crate::to_storage_err;

pub fn migrate(conn: &Connection) -> FieldlogResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS tracked_changes (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            entity        TEXT NOT NULL,
            entity_id     TEXT NOT NULL,
            operation_id  TEXT NOT NULL,
            device_id     TEXT NOT NULL,
            timestamp     INTEGER NOT NULL,
            checksum      TEXT NOT NULL,
            tracked_at    INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_tracked_changes_entity
            ON tracked_changes(entity, entity_id);
        CREATE INDEX IF NOT EXISTS idx_tracked_changes_tracked_at
            ON tracked_changes(tracked_at);
        ",
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}
