//! v006: conflicts.

use rusqlite::Connection;

use fieldlog_core::errors::FieldlogResult;

use crate::to_storage_err;

pub fn migrate(conn: &Connection) -> FieldlogResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS conflicts (
            id                   TEXT PRIMARY KEY,
            entity_type          TEXT NOT NULL,
            entity_id            TEXT NOT NULL,
            local_data           TEXT,
            remote_data          TEXT NOT NULL,
            current_version      INTEGER NOT NULL,
            expected_version     INTEGER NOT NULL,
            remote_operation_id  TEXT NOT NULL UNIQUE,
            remote_client_id     TEXT NOT NULL,
            timestamp            INTEGER NOT NULL,
            status               TEXT NOT NULL DEFAULT 'pending'
                                 CHECK (status IN ('pending', 'resolved', 'dismissed')),
            resolution           TEXT,
            resolved_at          INTEGER
        );

        CREATE INDEX IF NOT EXISTS idx_conflicts_status ON conflicts(status, timestamp);
        CREATE INDEX IF NOT EXISTS idx_conflicts_entity ON conflicts(entity_type, entity_id);
        ",
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}
