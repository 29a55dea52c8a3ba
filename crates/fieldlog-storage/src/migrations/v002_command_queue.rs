//! v002: command_queue.

use rusqlite::Connection;

use fieldlog_core::errors::FieldlogResult;

use crate::to_storage_err;

pub fn migrate(conn: &Connection) -> FieldlogResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS command_queue (
            id           TEXT PRIMARY KEY,
            operation    TEXT NOT NULL,
            added_at     INTEGER NOT NULL,
            status       TEXT NOT NULL DEFAULT 'pending'
                         CHECK (status IN ('pending', 'processing', 'completed', 'failed')),
            attempts     INTEGER NOT NULL DEFAULT 0,
            last_attempt INTEGER,
            error        TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_command_queue_status
            ON command_queue(status, added_at);
        ",
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}
