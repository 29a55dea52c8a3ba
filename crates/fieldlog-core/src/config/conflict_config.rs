use serde::{Deserialize, Serialize};

use crate::constants::{CONFLICT_AUTO_DISMISS_DAYS, CONFLICT_CLEANUP_HOURS};

/// Conflict retention.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConflictConfig {
    pub auto_dismiss_days: i64,
    pub cleanup_hours: i64,
}

impl Default for ConflictConfig {
    fn default() -> Self {
        Self {
            auto_dismiss_days: CONFLICT_AUTO_DISMISS_DAYS,
            cleanup_hours: CONFLICT_CLEANUP_HOURS,
        }
    }
}

/// Timeouts for the built-in protection flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtectionConfig {
    pub active_visit_timeout_ms: u64,
    pub day_session_timeout_ms: u64,
    pub restore_timeout_ms: u64,
}

impl Default for ProtectionConfig {
    fn default() -> Self {
        Self {
            active_visit_timeout_ms: 5 * 60 * 1000,
            day_session_timeout_ms: 60 * 1000,
            restore_timeout_ms: 30 * 1000,
        }
    }
}
