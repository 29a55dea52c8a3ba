//! v003: protection_flags.

use rusqlite::Connection;

use fieldlog_core::errors::FieldlogResult;

use crate::to_storage_err;

pub fn migrate(conn: &Connection) -> FieldlogResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS protection_flags (
            key         TEXT PRIMARY KEY,
            set_time    INTEGER NOT NULL,
            timeout_ms  INTEGER NOT NULL CHECK (timeout_ms > 0)
        );
        ",
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}
