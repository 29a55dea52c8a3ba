/// Local durable store errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StorageError {
    #[error("SQLite error: {message}")]
    SqliteError { message: String },

    #[error("migration failed at version {version}: {reason}")]
    MigrationFailed { version: u32, reason: String },

    #[error("corrupt record detected: {details}")]
    CorruptionDetected { details: String },
}
