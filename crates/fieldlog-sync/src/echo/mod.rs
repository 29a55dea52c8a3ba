//! Echo filter: recognizes inbound rows that are this device's own writes
//! bouncing back from the remote store.
//!
//! Layers, in order: device id (definitive when present), server-time
//! proximity to a tracked change, checksum of a tracked change.

pub mod change_tracker;
pub mod predicates;

use std::sync::Arc;

use tracing::debug;

use fieldlog_core::checksum::content_checksum;
use fieldlog_core::config::EchoConfig;
use fieldlog_core::errors::FieldlogResult;
use fieldlog_core::models::RemoteRow;

pub use change_tracker::ChangeTracker;
pub use predicates::DeviceMatch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EchoReason {
    DeviceId,
    TimestampProximity,
    Checksum,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EchoVerdict {
    NotEcho,
    Echo(EchoReason),
}

impl EchoVerdict {
    pub fn is_echo(&self) -> bool {
        matches!(self, EchoVerdict::Echo(_))
    }
}

pub struct EchoFilter {
    tracker: Arc<ChangeTracker>,
    device_id: String,
    config: EchoConfig,
}

impl EchoFilter {
    pub fn new(tracker: Arc<ChangeTracker>, device_id: String, config: EchoConfig) -> Self {
        Self {
            tracker,
            device_id,
            config,
        }
    }

    pub async fn classify(&self, row: &RemoteRow) -> FieldlogResult<EchoVerdict> {
        let verdict = match predicates::device_match(row, &self.device_id) {
            DeviceMatch::Local => EchoVerdict::Echo(EchoReason::DeviceId),
            DeviceMatch::Other => EchoVerdict::NotEcho,
            DeviceMatch::Unknown => {
                let changes = self.tracker.recent(&row.entity, &row.id).await?;
                if predicates::timestamp_match(row, &changes, self.config.timestamp_window_ms) {
                    EchoVerdict::Echo(EchoReason::TimestampProximity)
                } else if !changes.is_empty()
                    && predicates::checksum_match(row, &payload_checksum(row)?, &changes)
                {
                    EchoVerdict::Echo(EchoReason::Checksum)
                } else {
                    EchoVerdict::NotEcho
                }
            }
        };
        if let EchoVerdict::Echo(reason) = verdict {
            debug!(entity = %row.entity, id = %row.id, ?reason, "dropping echo");
        }
        Ok(verdict)
    }
}

/// Checksum of the operation content a row carries, without its envelope.
fn payload_checksum(row: &RemoteRow) -> FieldlogResult<String> {
    content_checksum(row.payload.get("kind").unwrap_or(&row.payload))
}
