use serde::{Deserialize, Serialize};

use crate::constants::{
    COMPLETION_DEDUPE_WINDOW_MS, PULL_PAGE_SIZE, QUEUE_BATCH_SIZE, QUEUE_EXPIRY_HOURS,
    QUEUE_MAX_ATTEMPTS,
};

/// Pull/merge behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Rows requested per pull page. Default: 500.
    pub pull_page_size: usize,
    /// Completions for the same address closer than this are one completion. Default: 5000.
    pub completion_dedupe_window_ms: i64,
    /// Whether the engine assumes connectivity when opened. Default: true.
    pub start_online: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            pull_page_size: PULL_PAGE_SIZE,
            completion_dedupe_window_ms: COMPLETION_DEDUPE_WINDOW_MS,
            start_online: true,
        }
    }
}

/// Command queue behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Commands claimed per drain cycle. Default: 50.
    pub batch_size: usize,
    /// Attempts before a failed command is left for manual reset. Default: 5.
    pub max_attempts: u32,
    /// Age after which commands are purged regardless of status. Default: 24.
    pub expiry_hours: i64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            batch_size: QUEUE_BATCH_SIZE,
            max_attempts: QUEUE_MAX_ATTEMPTS,
            expiry_hours: QUEUE_EXPIRY_HOURS,
        }
    }
}
