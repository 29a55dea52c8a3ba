//! Single write connection behind `tokio::sync::Mutex`.
//! Every store access suspends the caller instead of blocking the runtime.

use rusqlite::Connection;
use tokio::sync::Mutex;

use fieldlog_core::errors::FieldlogResult;

use crate::to_storage_err;

/// A single connection protected by an async mutex.
pub struct WriteConnection {
    conn: Mutex<Connection>,
}

impl WriteConnection {
    /// Wrap an already configured and migrated connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Acquire the lock and execute a closure with the connection.
    pub async fn with_conn<F, T>(&self, f: F) -> FieldlogResult<T>
    where
        F: FnOnce(&Connection) -> FieldlogResult<T>,
    {
        let guard = self.conn.lock().await;
        f(&guard)
    }

    /// Run a closure inside one SQLite transaction. Commits on `Ok`,
    /// rolls back on `Err`.
    pub async fn with_transaction<F, T>(&self, f: F) -> FieldlogResult<T>
    where
        F: FnOnce(&Connection) -> FieldlogResult<T>,
    {
        let mut guard = self.conn.lock().await;
        let tx = guard
            .transaction()
            .map_err(|e| to_storage_err(e.to_string()))?;
        let value = f(&*tx)?;
        tx.commit().map_err(|e| to_storage_err(e.to_string()))?;
        Ok(value)
    }
}
