/// fieldlog version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Current `AppState` schema version. Older persisted states are migrated on load.
pub const STATE_SCHEMA_VERSION: u32 = 2;

/// Queue items older than this are purged regardless of status.
pub const QUEUE_EXPIRY_HOURS: i64 = 24;

/// Submission attempts per queued command before it stays failed.
pub const QUEUE_MAX_ATTEMPTS: u32 = 5;

/// Default optimistic update timeout.
pub const OPTIMISTIC_TIMEOUT_MS: u64 = 30_000;

/// Retries for a timed-out or failed optimistic update when auto-retry is on.
pub const OPTIMISTIC_MAX_RETRIES: u32 = 3;

/// How long a confirmed optimistic entry stays visible before removal.
pub const CONFIRMED_GRACE_MS: u64 = 5_000;

/// How long a reverted optimistic entry stays visible before removal.
pub const REVERTED_GRACE_MS: u64 = 1_000;

/// Inbound change within this distance of a tracked local change is an echo.
pub const ECHO_TIMESTAMP_WINDOW_MS: i64 = 50;

/// Tracked changes kept for checksum echo matching.
pub const CHANGE_RETENTION_MS: i64 = 5 * 60 * 1000;

/// Pending conflicts older than this are dismissed automatically.
pub const CONFLICT_AUTO_DISMISS_DAYS: i64 = 7;

/// Resolved and dismissed conflicts are purged after this long.
pub const CONFLICT_CLEANUP_HOURS: i64 = 24;

/// Two completions for the same address within this window are one completion.
pub const COMPLETION_DEDUPE_WINDOW_MS: i64 = 5_000;

/// Upper bound for any protection flag. Flags never protect indefinitely.
pub const MAX_PROTECTION_FLAG_TIMEOUT_MS: u64 = 60 * 60 * 1000;

/// Rows requested per pull page.
pub const PULL_PAGE_SIZE: usize = 500;

/// Commands claimed per drain cycle.
pub const QUEUE_BATCH_SIZE: usize = 50;
