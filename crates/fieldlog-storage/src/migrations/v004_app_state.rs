//! v004: app_state (single row), app_state_backups.

use rusqlite::Connection;

use fieldlog_core::errors::FieldlogResult;

use crate::to_storage_err;

pub fn migrate(conn: &Connection) -> FieldlogResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS app_state (
            id              INTEGER PRIMARY KEY CHECK (id = 1),
            state           TEXT NOT NULL,
            schema_version  INTEGER NOT NULL,
            updated_at      INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS app_state_backups (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            raw         TEXT NOT NULL,
            reason      TEXT NOT NULL,
            created_at  INTEGER NOT NULL
        );
        ",
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}
