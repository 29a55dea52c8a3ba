//! Schema migrations using PRAGMA user_version.

pub mod v001_operation_log;
pub mod v002_command_queue;
pub mod v003_protection_flags;
pub mod v004_app_state;
pub mod v005_tracked_changes;
pub mod v006_conflicts;

use rusqlite::Connection;
use tracing::info;

use fieldlog_core::errors::{FieldlogResult, StorageError};

type Migration = fn(&Connection) -> FieldlogResult<()>;

const MIGRATIONS: &[(u32, Migration)] = &[
    (1, v001_operation_log::migrate),
    (2, v002_command_queue::migrate),
    (3, v003_protection_flags::migrate),
    (4, v004_app_state::migrate),
    (5, v005_tracked_changes::migrate),
    (6, v006_conflicts::migrate),
];

/// Highest schema version this build knows about.
pub const LATEST_VERSION: u32 = 6;

/// Run all pending migrations, each in its own transaction.
pub fn run_migrations(conn: &Connection) -> FieldlogResult<u32> {
    let current = current_version(conn)?;

    for (version, migrate) in MIGRATIONS {
        if current >= *version {
            continue;
        }
        let fail = |reason: String| StorageError::MigrationFailed {
            version: *version,
            reason,
        };
        conn.execute_batch("BEGIN IMMEDIATE")
            .map_err(|e| fail(e.to_string()))?;
        let applied = migrate(conn).and_then(|()| {
            conn.pragma_update(None, "user_version", version)
                .map_err(|e| fail(e.to_string()).into())
        });
        match applied {
            Ok(()) => {
                conn.execute_batch("COMMIT")
                    .map_err(|e| fail(e.to_string()))?;
                info!(version = version, "applied migration");
            }
            Err(e) => {
                let _ = conn.execute_batch("ROLLBACK");
                return Err(fail(e.to_string()).into());
            }
        }
    }

    current_version(conn)
}

/// Get the current schema version.
pub fn current_version(conn: &Connection) -> FieldlogResult<u32> {
    conn.pragma_query_value(None, "user_version", |row| row.get(0))
        .map_err(|e| {
            StorageError::SqliteError {
                message: e.to_string(),
            }
            .into()
        })
}
