//! Version conflicts between local entities and incoming remote operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictEntityType {
    Completion,
    Arrangement,
}

impl ConflictEntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictEntityType::Completion => "completion",
            ConflictEntityType::Arrangement => "arrangement",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "completion" => Some(ConflictEntityType::Completion),
            "arrangement" => Some(ConflictEntityType::Arrangement),
            _ => None,
        }
    }
}

/// `Pending` is the only non-terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStatus {
    Pending,
    Resolved,
    Dismissed,
}

impl ConflictStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictStatus::Pending => "pending",
            ConflictStatus::Resolved => "resolved",
            ConflictStatus::Dismissed => "dismissed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ConflictStatus::Pending),
            "resolved" => Some(ConflictStatus::Resolved),
            "dismissed" => Some(ConflictStatus::Dismissed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictResolution {
    KeepLocal,
    UseRemote,
    Manual,
}

impl ConflictResolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictResolution::KeepLocal => "keep-local",
            ConflictResolution::UseRemote => "use-remote",
            ConflictResolution::Manual => "manual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "keep-local" => Some(ConflictResolution::KeepLocal),
            "use-remote" => Some(ConflictResolution::UseRemote),
            "manual" => Some(ConflictResolution::Manual),
            _ => None,
        }
    }
}

/// A detected mismatch between an operation's expected version and the
/// local entity's version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionConflict {
    pub id: String,
    pub entity_type: ConflictEntityType,
    pub entity_id: String,
    /// `None` when the entity no longer exists locally.
    pub local_data: Option<serde_json::Value>,
    /// Fields the remote side wrote. Merged over `local_data` on use-remote.
    pub remote_data: serde_json::Value,
    /// Local version at detection time.
    pub current_version: u64,
    /// Version the remote operation was written against.
    pub expected_version: u64,
    pub remote_operation_id: String,
    pub remote_client_id: String,
    pub timestamp: DateTime<Utc>,
    pub status: ConflictStatus,
    pub resolution: Option<ConflictResolution>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl VersionConflict {
    pub fn is_pending(&self) -> bool {
        self.status == ConflictStatus::Pending
    }
}
