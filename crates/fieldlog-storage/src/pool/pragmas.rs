//! Connection settings for the local store.
//!
//! Queued commands and the sequence counter must survive power loss, so the
//! single writer runs with WAL and `synchronous = FULL`.

use std::time::Duration;

use rusqlite::Connection;
use tracing::debug;

use fieldlog_core::errors::FieldlogResult;

use crate::to_storage_err;

/// `PRAGMA synchronous` level for FULL.
const SYNCHRONOUS_FULL: i64 = 2;

/// Settings read back from a live connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Durability {
    pub journal_mode: String,
    pub synchronous: i64,
    pub foreign_keys: bool,
}

impl Durability {
    /// WAL with a full fsync on every commit. In-memory databases never
    /// qualify.
    pub fn is_crash_safe(&self) -> bool {
        self.journal_mode.eq_ignore_ascii_case("wal") && self.synchronous >= SYNCHRONOUS_FULL
    }
}

pub fn apply_pragmas(conn: &Connection) -> FieldlogResult<()> {
    // journal_mode answers with the mode it ended up in ("memory" for
    // in-memory databases), so it is read rather than executed.
    let mode: String = conn
        .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
        .map_err(|e| to_storage_err(e.to_string()))?;
    for (name, value) in [
        ("synchronous", "FULL"),
        ("foreign_keys", "ON"),
        ("temp_store", "MEMORY"),
    ] {
        conn.pragma_update(None, name, value)
            .map_err(|e| to_storage_err(format!("{name}: {e}")))?;
    }
    conn.busy_timeout(Duration::from_secs(5))
        .map_err(|e| to_storage_err(format!("busy_timeout: {e}")))?;
    debug!(journal_mode = %mode, "connection pragmas applied");
    Ok(())
}

pub fn read_durability(conn: &Connection) -> FieldlogResult<Durability> {
    let read_text = |name: &str| -> FieldlogResult<String> {
        conn.pragma_query_value(None, name, |row| row.get(0))
            .map_err(|e| to_storage_err(format!("{name}: {e}")))
    };
    let read_int = |name: &str| -> FieldlogResult<i64> {
        conn.pragma_query_value(None, name, |row| row.get(0))
            .map_err(|e| to_storage_err(format!("{name}: {e}")))
    };
    Ok(Durability {
        journal_mode: read_text("journal_mode")?,
        synchronous: read_int("synchronous")?,
        foreign_keys: read_int("foreign_keys")? == 1,
    })
}
