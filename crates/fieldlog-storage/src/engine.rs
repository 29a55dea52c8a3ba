//! StorageEngine: opens the database, applies pragmas, runs migrations,
//! and hands out serialized connection access.

use std::path::{Path, PathBuf};

use rusqlite::Connection;
use tracing::{info, warn};

use fieldlog_core::errors::FieldlogResult;

use crate::migrations;
use crate::pool::pragmas::{apply_pragmas, read_durability};
use crate::pool::WriteConnection;
use crate::to_storage_err;

pub struct StorageEngine {
    writer: WriteConnection,
    db_path: Option<PathBuf>,
}

impl StorageEngine {
    /// Open (or create) a database file.
    pub fn open(path: &Path) -> FieldlogResult<Self> {
        let conn = Connection::open(path).map_err(|e| to_storage_err(e.to_string()))?;
        let engine = Self::initialize(conn, Some(path.to_path_buf()))?;
        info!(path = %path.display(), "opened fieldlog store");
        Ok(engine)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> FieldlogResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| to_storage_err(e.to_string()))?;
        Self::initialize(conn, None)
    }

    fn initialize(conn: Connection, db_path: Option<PathBuf>) -> FieldlogResult<Self> {
        apply_pragmas(&conn)?;
        if let Some(path) = &db_path {
            let durability = read_durability(&conn)?;
            if !durability.is_crash_safe() {
                warn!(path = %path.display(), ?durability, "store is not crash safe");
            }
        }
        migrations::run_migrations(&conn)?;
        Ok(Self {
            writer: WriteConnection::new(conn),
            db_path,
        })
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Execute a closure with exclusive access to the connection.
    pub async fn with_conn<F, T>(&self, f: F) -> FieldlogResult<T>
    where
        F: FnOnce(&Connection) -> FieldlogResult<T>,
    {
        self.writer.with_conn(f).await
    }

    /// Execute a closure inside one transaction.
    pub async fn with_transaction<F, T>(&self, f: F) -> FieldlogResult<T>
    where
        F: FnOnce(&Connection) -> FieldlogResult<T>,
    {
        self.writer.with_transaction(f).await
    }
}
