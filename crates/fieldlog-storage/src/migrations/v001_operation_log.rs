//! v001: device_meta (identity, sequence counter, pull watermark), operation_log.

use rusqlite::Connection;

use fieldlog_core::errors::FieldlogResult;

use crate::to_storage_err;

pub fn migrate(conn: &Connection) -> FieldlogResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS device_meta (
            key     TEXT PRIMARY KEY,
            value   TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS operation_log (
            id          TEXT PRIMARY KEY,
            client_id   TEXT NOT NULL,
            sequence    INTEGER NOT NULL,
            op_type     TEXT NOT NULL,
            operation   TEXT NOT NULL,
            origin      TEXT NOT NULL CHECK (origin IN ('local', 'remote')),
            recorded_at INTEGER NOT NULL,
            UNIQUE (client_id, sequence)
        );

        CREATE INDEX IF NOT EXISTS idx_operation_log_recorded
            ON operation_log(recorded_at);
        ",
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}
