//! # fieldlog-storage
//!
//! SQLite persistence for the fieldlog client: a single write connection
//! behind an async mutex, pragmas, `PRAGMA user_version` migrations, and
//! one query module per table.

pub mod engine;
pub mod migrations;
pub mod pool;
pub mod queries;

pub use engine::StorageEngine;

use chrono::{DateTime, Utc};
use fieldlog_core::errors::{FieldlogError, StorageError};

/// Wrap a rusqlite (or other) message as a storage error.
pub fn to_storage_err(message: String) -> FieldlogError {
    FieldlogError::StorageError(StorageError::SqliteError { message })
}

/// Decode a stored epoch-millisecond column.
pub(crate) fn from_millis(ms: i64) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::from_timestamp_millis(ms).ok_or(rusqlite::Error::IntegralValueOutOfRange(0, ms))
}

/// Decode a stored JSON text column.
pub(crate) fn from_json<T: serde::de::DeserializeOwned>(
    column: usize,
    text: &str,
) -> Result<T, rusqlite::Error> {
    serde_json::from_str(text).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e))
    })
}
