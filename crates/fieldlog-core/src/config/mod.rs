//! Configuration. Every section defaults independently, so an empty TOML
//! document yields a fully usable config.

pub mod conflict_config;
pub mod logging_config;
pub mod optimistic_config;
pub mod sync_config;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::MAX_PROTECTION_FLAG_TIMEOUT_MS;
use crate::errors::{FieldlogError, FieldlogResult};

pub use conflict_config::{ConflictConfig, ProtectionConfig};
pub use logging_config::{LogFormat, LoggingConfig};
pub use optimistic_config::{EchoConfig, OptimisticConfig};
pub use sync_config::{QueueConfig, SyncConfig};

/// Root configuration for a fieldlog client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldlogConfig {
    pub sync: SyncConfig,
    pub queue: QueueConfig,
    pub optimistic: OptimisticConfig,
    pub echo: EchoConfig,
    pub conflicts: ConflictConfig,
    pub protection: ProtectionConfig,
    pub logging: LoggingConfig,
}

impl FieldlogConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml(toml_str: &str) -> FieldlogResult<Self> {
        let config: Self = toml::from_str(toml_str)
            .map_err(|e| FieldlogError::ConfigError(format!("<string>: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file.
    pub fn load(path: &Path) -> FieldlogResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            FieldlogError::ConfigError(format!("{}: {e}", path.display()))
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            FieldlogError::ConfigError(format!("{}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> FieldlogResult<String> {
        toml::to_string_pretty(self).map_err(|e| FieldlogError::ConfigError(e.to_string()))
    }

    pub fn validate(&self) -> FieldlogResult<()> {
        fn fail(field: &str, message: &str) -> FieldlogResult<()> {
            Err(FieldlogError::ConfigError(format!("{field}: {message}")))
        }

        if self.queue.batch_size == 0 {
            return fail("queue.batch_size", "must be greater than 0");
        }
        if self.queue.max_attempts == 0 {
            return fail("queue.max_attempts", "must be greater than 0");
        }
        if self.queue.expiry_hours <= 0 {
            return fail("queue.expiry_hours", "must be greater than 0");
        }
        if self.sync.pull_page_size == 0 {
            return fail("sync.pull_page_size", "must be greater than 0");
        }
        if self.optimistic.timeout_ms == 0 {
            return fail("optimistic.timeout_ms", "must be greater than 0");
        }
        for (field, timeout) in [
            ("protection.active_visit_timeout_ms", self.protection.active_visit_timeout_ms),
            ("protection.day_session_timeout_ms", self.protection.day_session_timeout_ms),
            ("protection.restore_timeout_ms", self.protection.restore_timeout_ms),
        ] {
            if timeout == 0 || timeout > MAX_PROTECTION_FLAG_TIMEOUT_MS {
                return fail(field, "must be within (0, 1h]");
            }
        }
        if self.conflicts.auto_dismiss_days <= 0 || self.conflicts.cleanup_hours <= 0 {
            return fail("conflicts", "retention windows must be positive");
        }
        Ok(())
    }
}
