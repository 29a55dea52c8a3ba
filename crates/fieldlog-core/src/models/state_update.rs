//! UI-visible optimistic deltas layered over confirmed state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entities::{EntityData, EntityKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateType {
    Optimistic,
    Confirmed,
    Reverted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateOperation {
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateUpdate {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub update_type: UpdateType,
    pub operation: UpdateOperation,
    pub entity: EntityKind,
    pub entity_id: String,
    /// The entity as it should appear; for deletes, the removed entity.
    pub data: EntityData,
}
