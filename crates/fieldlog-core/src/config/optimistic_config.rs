use serde::{Deserialize, Serialize};

use crate::constants::{
    CHANGE_RETENTION_MS, CONFIRMED_GRACE_MS, ECHO_TIMESTAMP_WINDOW_MS, OPTIMISTIC_MAX_RETRIES,
    OPTIMISTIC_TIMEOUT_MS, REVERTED_GRACE_MS,
};

/// Optimistic update timeout and retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimisticConfig {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub auto_retry: bool,
    pub confirmed_grace_ms: u64,
    pub reverted_grace_ms: u64,
}

impl Default for OptimisticConfig {
    fn default() -> Self {
        Self {
            timeout_ms: OPTIMISTIC_TIMEOUT_MS,
            max_retries: OPTIMISTIC_MAX_RETRIES,
            auto_retry: true,
            confirmed_grace_ms: CONFIRMED_GRACE_MS,
            reverted_grace_ms: REVERTED_GRACE_MS,
        }
    }
}

/// Echo detection windows.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EchoConfig {
    /// Timestamp-proximity window. Default: 50 ms.
    pub timestamp_window_ms: i64,
    /// How long tracked changes are kept for checksum matching. Default: 5 min.
    pub change_retention_ms: i64,
}

impl Default for EchoConfig {
    fn default() -> Self {
        Self {
            timestamp_window_ms: ECHO_TIMESTAMP_WINDOW_MS,
            change_retention_ms: CHANGE_RETENTION_MS,
        }
    }
}
