//! Outgoing changes remembered briefly for echo detection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedChange {
    pub entity: String,
    pub entity_id: String,
    pub operation_id: String,
    pub device_id: String,
    /// Server arrival timestamp of the confirmed write.
    pub timestamp: DateTime<Utc>,
    /// Checksum of the submitted operation content (`kind`).
    pub checksum: String,
    pub tracked_at: DateTime<Utc>,
}
