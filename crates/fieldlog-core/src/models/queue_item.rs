//! Durable command queue records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::operation::Operation;

/// Lifecycle: `Pending → Processing → (deleted | Failed)`, `Failed → Pending` on reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Pending => "pending",
            QueueStatus::Processing => "processing",
            QueueStatus::Completed => "completed",
            QueueStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(QueueStatus::Pending),
            "processing" => Some(QueueStatus::Processing),
            "completed" => Some(QueueStatus::Completed),
            "failed" => Some(QueueStatus::Failed),
            _ => None,
        }
    }
}

/// An operation waiting for submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandQueueItem {
    pub id: String,
    pub operation: Operation,
    pub added_at: DateTime<Utc>,
    pub status: QueueStatus,
    pub attempts: u32,
    pub last_attempt: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

/// Item counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: usize,
    pub processing: usize,
    pub failed: usize,
}

impl QueueStats {
    pub fn total(&self) -> usize {
        self.pending + self.processing + self.failed
    }
}
