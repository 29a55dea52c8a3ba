//! Field-work entities: addresses, completions (visit outcomes),
//! payment arrangements, and working-day sessions.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One address on the working list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub address: String,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
}

impl Address {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            lat: None,
            lng: None,
        }
    }
}

/// Result of a visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    /// Paid in full.
    #[serde(rename = "PIF")]
    Pif,
    #[serde(rename = "Done")]
    Done,
    /// Debtor absent.
    #[serde(rename = "DA")]
    Da,
    /// Payment arrangement made.
    #[serde(rename = "ARR")]
    Arr,
}

/// A recorded visit outcome for one address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub id: String,
    /// Position of the address in the list identified by `list_version`.
    pub index: usize,
    pub address: String,
    pub outcome: Outcome,
    #[serde(default)]
    pub amount: Option<f64>,
    pub timestamp: DateTime<Utc>,
    pub list_version: u32,
    #[serde(default)]
    pub time_spent_secs: Option<u64>,
    #[serde(default = "initial_version")]
    pub version: u64,
}

impl Completion {
    /// Equal in everything except `version`.
    pub fn same_content(&self, other: &Completion) -> bool {
        self.id == other.id
            && self.index == other.index
            && self.address == other.address
            && self.outcome == other.outcome
            && self.amount == other.amount
            && self.timestamp == other.timestamp
            && self.list_version == other.list_version
            && self.time_spent_secs == other.time_spent_secs
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArrangementStatus {
    Scheduled,
    Confirmed,
    Completed,
    Missed,
    Cancelled,
}

/// A scheduled payment agreed at an address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arrangement {
    pub id: String,
    pub address_index: usize,
    pub address: String,
    #[serde(default)]
    pub customer_name: Option<String>,
    pub amount: f64,
    pub scheduled_date: NaiveDate,
    pub status: ArrangementStatus,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default = "initial_version")]
    pub version: u64,
}

impl Arrangement {
    /// Equal in everything except `version` and `updated_at`.
    pub fn same_content(&self, other: &Arrangement) -> bool {
        self.id == other.id
            && self.address_index == other.address_index
            && self.address == other.address
            && self.customer_name == other.customer_name
            && self.amount == other.amount
            && self.scheduled_date == other.scheduled_date
            && self.status == other.status
            && self.notes == other.notes
    }
}

/// A working day. At most one session per date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaySession {
    pub date: NaiveDate,
    pub start: DateTime<Utc>,
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_secs: Option<i64>,
}

fn initial_version() -> u64 {
    1
}

/// Kinds of entity an optimistic update can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Completion,
    Arrangement,
    Session,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Completion => "completion",
            EntityKind::Arrangement => "arrangement",
            EntityKind::Session => "session",
        }
    }
}

/// A typed snapshot of one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum EntityData {
    Completion(Completion),
    Arrangement(Arrangement),
    Session(DaySession),
}

impl EntityData {
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityData::Completion(_) => EntityKind::Completion,
            EntityData::Arrangement(_) => EntityKind::Arrangement,
            EntityData::Session(_) => EntityKind::Session,
        }
    }

    /// Stable identifier within the entity kind. Sessions are keyed by date.
    pub fn entity_id(&self) -> String {
        match self {
            EntityData::Completion(c) => c.id.clone(),
            EntityData::Arrangement(a) => a.id.clone(),
            EntityData::Session(s) => s.date.to_string(),
        }
    }

    pub fn version(&self) -> Option<u64> {
        match self {
            EntityData::Completion(c) => Some(c.version),
            EntityData::Arrangement(a) => Some(a.version),
            EntityData::Session(_) => None,
        }
    }
}
