//! Protection flags: short-lived, persisted markers that suppress a racing
//! action while a local transition is in progress.
//!
//! A flag is active iff `0 <= now - set_time < timeout`. Negative elapsed
//! time means the wall clock moved backwards; such a flag is cleared and
//! reported inactive, so skew can never pin a flag on.

use std::sync::Arc;

use tracing::{debug, warn};

use fieldlog_core::config::ProtectionConfig;
use fieldlog_core::constants::MAX_PROTECTION_FLAG_TIMEOUT_MS;
use fieldlog_core::errors::{FieldlogError, FieldlogResult};
use fieldlog_core::Clock;
use fieldlog_storage::queries::protection_flag_ops::{self, StoredFlag};
use fieldlog_storage::StorageEngine;

/// Built-in flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtectionFlag {
    /// A visit timer is running; inbound active-index changes are ignored.
    ActiveVisit,
    /// A day session is starting or ending; inbound session changes are ignored.
    DaySession,
    /// A restore is replacing local state; merges absorb nothing.
    RestoreInProgress,
}

impl ProtectionFlag {
    pub fn key(&self) -> &'static str {
        match self {
            ProtectionFlag::ActiveVisit => "active_visit",
            ProtectionFlag::DaySession => "day_session",
            ProtectionFlag::RestoreInProgress => "restore_in_progress",
        }
    }

    pub fn timeout_ms(&self, config: &ProtectionConfig) -> u64 {
        match self {
            ProtectionFlag::ActiveVisit => config.active_visit_timeout_ms,
            ProtectionFlag::DaySession => config.day_session_timeout_ms,
            ProtectionFlag::RestoreInProgress => config.restore_timeout_ms,
        }
    }
}

pub struct ProtectionFlags {
    storage: Arc<StorageEngine>,
    clock: Arc<dyn Clock>,
    config: ProtectionConfig,
}

impl ProtectionFlags {
    pub fn new(storage: Arc<StorageEngine>, clock: Arc<dyn Clock>, config: ProtectionConfig) -> Self {
        Self {
            storage,
            clock,
            config,
        }
    }

    /// Set (or refresh) a flag for `timeout_ms`.
    pub async fn set(&self, key: &str, timeout_ms: u64) -> FieldlogResult<()> {
        if timeout_ms == 0 || timeout_ms > MAX_PROTECTION_FLAG_TIMEOUT_MS {
            return Err(FieldlogError::ValidationError(format!(
                "protection flag {key}: timeout {timeout_ms}ms outside (0, {MAX_PROTECTION_FLAG_TIMEOUT_MS}]"
            )));
        }
        let flag = StoredFlag {
            set_time_ms: self.clock.now_ms(),
            timeout_ms,
        };
        self.storage
            .with_conn(|conn| protection_flag_ops::upsert_flag(conn, key, flag))
            .await?;
        debug!(key, timeout_ms, "protection flag set");
        Ok(())
    }

    pub async fn is_active(&self, key: &str) -> FieldlogResult<bool> {
        let now_ms = self.clock.now_ms();
        self.storage
            .with_conn(|conn| {
                let Some(flag) = protection_flag_ops::get_flag(conn, key)? else {
                    return Ok(false);
                };
                let elapsed = now_ms - flag.set_time_ms;
                if elapsed < 0 {
                    warn!(key, elapsed_ms = elapsed, "clock skew detected, clearing protection flag");
                    protection_flag_ops::delete_flag_if(conn, key, flag)?;
                    return Ok(false);
                }
                if elapsed as u64 >= flag.timeout_ms {
                    debug!(key, elapsed_ms = elapsed, "protection flag expired");
                    protection_flag_ops::delete_flag_if(conn, key, flag)?;
                    return Ok(false);
                }
                Ok(true)
            })
            .await
    }

    /// Remove a flag unconditionally.
    pub async fn clear(&self, key: &str) -> FieldlogResult<()> {
        let removed = self
            .storage
            .with_conn(|conn| protection_flag_ops::delete_flag(conn, key))
            .await?;
        debug!(key, removed, "protection flag cleared");
        Ok(())
    }

    pub async fn set_flag(&self, flag: ProtectionFlag) -> FieldlogResult<()> {
        self.set(flag.key(), flag.timeout_ms(&self.config)).await
    }

    pub async fn is_flag_active(&self, flag: ProtectionFlag) -> FieldlogResult<bool> {
        self.is_active(flag.key()).await
    }

    pub async fn clear_flag(&self, flag: ProtectionFlag) -> FieldlogResult<()> {
        self.clear(flag.key()).await
    }
}
