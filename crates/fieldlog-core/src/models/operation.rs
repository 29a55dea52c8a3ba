//! The operation log vocabulary. Every mutation to a shared entity is one
//! immutable `Operation`; corrections are new operations, never edits.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::conflict::{ConflictEntityType, ConflictResolution};
use super::entities::{Address, Arrangement, Completion, DaySession, EntityData};
use super::patch::{ArrangementPatch, CompletionPatch};

/// One sequenced, immutable record of an intended mutation.
///
/// `(client_id, sequence)` is unique and strictly increasing per device.
/// Global order is the remote store's arrival order, never `timestamp`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub id: String,
    pub kind: OperationKind,
    pub timestamp: DateTime<Utc>,
    pub client_id: String,
    pub sequence: u64,
}

impl Operation {
    pub fn target(&self) -> Option<EntityTarget> {
        self.kind.target()
    }
}

/// Closed union of entity-action pairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationKind {
    CompletionCreate {
        completion: Completion,
    },
    CompletionUpdate {
        id: String,
        changes: CompletionPatch,
        expected_version: u64,
    },
    CompletionDelete {
        id: String,
    },
    ArrangementCreate {
        arrangement: Arrangement,
    },
    ArrangementUpdate {
        id: String,
        changes: ArrangementPatch,
        expected_version: u64,
    },
    ArrangementDelete {
        id: String,
    },
    AddressesSet {
        addresses: Vec<Address>,
        list_version: u32,
    },
    AddressAdd {
        address: Address,
    },
    ActiveIndexSet {
        index: Option<usize>,
        start_time: Option<DateTime<Utc>>,
    },
    SessionStart {
        session: DaySession,
    },
    SessionEnd {
        date: NaiveDate,
        end_time: DateTime<Utc>,
    },
    /// Audit record of a conflict resolution, carrying the resulting entity.
    ConflictResolve {
        conflict_id: String,
        resolution: ConflictResolution,
        resulting_version: u64,
        resulting: EntityData,
    },
}

/// The versioned entity an operation expects to find locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityTarget {
    pub entity_type: ConflictEntityType,
    pub entity_id: String,
    /// `0` for creates: the entity is expected not to exist yet.
    pub expected_version: u64,
}

impl OperationKind {
    /// Wire name, e.g. `COMPLETION_CREATE`.
    pub fn name(&self) -> &'static str {
        match self {
            OperationKind::CompletionCreate { .. } => "COMPLETION_CREATE",
            OperationKind::CompletionUpdate { .. } => "COMPLETION_UPDATE",
            OperationKind::CompletionDelete { .. } => "COMPLETION_DELETE",
            OperationKind::ArrangementCreate { .. } => "ARRANGEMENT_CREATE",
            OperationKind::ArrangementUpdate { .. } => "ARRANGEMENT_UPDATE",
            OperationKind::ArrangementDelete { .. } => "ARRANGEMENT_DELETE",
            OperationKind::AddressesSet { .. } => "ADDRESSES_SET",
            OperationKind::AddressAdd { .. } => "ADDRESS_ADD",
            OperationKind::ActiveIndexSet { .. } => "ACTIVE_INDEX_SET",
            OperationKind::SessionStart { .. } => "SESSION_START",
            OperationKind::SessionEnd { .. } => "SESSION_END",
            OperationKind::ConflictResolve { .. } => "CONFLICT_RESOLVE",
        }
    }

    /// Entity table name used for remote rows.
    pub fn entity_name(&self) -> &'static str {
        match self {
            OperationKind::CompletionCreate { .. }
            | OperationKind::CompletionUpdate { .. }
            | OperationKind::CompletionDelete { .. } => "completion",
            OperationKind::ArrangementCreate { .. }
            | OperationKind::ArrangementUpdate { .. }
            | OperationKind::ArrangementDelete { .. } => "arrangement",
            OperationKind::AddressesSet { .. } | OperationKind::AddressAdd { .. } => "address",
            OperationKind::ActiveIndexSet { .. } => "active_index",
            OperationKind::SessionStart { .. } | OperationKind::SessionEnd { .. } => "session",
            OperationKind::ConflictResolve { resulting, .. } => resulting.kind().as_str(),
        }
    }

    /// Identifier of the affected entity within `entity_name()`.
    pub fn entity_id(&self) -> String {
        match self {
            OperationKind::CompletionCreate { completion } => completion.id.clone(),
            OperationKind::ArrangementCreate { arrangement } => arrangement.id.clone(),
            OperationKind::CompletionUpdate { id, .. }
            | OperationKind::CompletionDelete { id }
            | OperationKind::ArrangementUpdate { id, .. }
            | OperationKind::ArrangementDelete { id } => id.clone(),
            OperationKind::AddressesSet { list_version, .. } => format!("list-{list_version}"),
            OperationKind::AddressAdd { address } => address.address.clone(),
            OperationKind::ActiveIndexSet { .. } => "active".to_string(),
            OperationKind::SessionStart { session } => session.date.to_string(),
            OperationKind::SessionEnd { date, .. } => date.to_string(),
            OperationKind::ConflictResolve { resulting, .. } => resulting.entity_id(),
        }
    }

    /// Versioned target for conflict detection. Deletes, list edits, and
    /// audit records carry no version expectation.
    pub fn target(&self) -> Option<EntityTarget> {
        match self {
            OperationKind::CompletionCreate { completion } => Some(EntityTarget {
                entity_type: ConflictEntityType::Completion,
                entity_id: completion.id.clone(),
                expected_version: 0,
            }),
            OperationKind::CompletionUpdate {
                id,
                expected_version,
                ..
            } => Some(EntityTarget {
                entity_type: ConflictEntityType::Completion,
                entity_id: id.clone(),
                expected_version: *expected_version,
            }),
            OperationKind::ArrangementCreate { arrangement } => Some(EntityTarget {
                entity_type: ConflictEntityType::Arrangement,
                entity_id: arrangement.id.clone(),
                expected_version: 0,
            }),
            OperationKind::ArrangementUpdate {
                id,
                expected_version,
                ..
            } => Some(EntityTarget {
                entity_type: ConflictEntityType::Arrangement,
                entity_id: id.clone(),
                expected_version: *expected_version,
            }),
            OperationKind::CompletionDelete { .. }
            | OperationKind::ArrangementDelete { .. }
            | OperationKind::AddressesSet { .. }
            | OperationKind::AddressAdd { .. }
            | OperationKind::ActiveIndexSet { .. }
            | OperationKind::SessionStart { .. }
            | OperationKind::SessionEnd { .. }
            | OperationKind::ConflictResolve { .. } => None,
        }
    }
}
