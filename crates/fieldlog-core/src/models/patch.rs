//! Typed partial updates carried by update operations.
//!
//! `None` means "leave unchanged". For optional entity fields the patch
//! field is doubly optional: `Some(None)` clears the value.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::entities::{Arrangement, ArrangementStatus, Completion, Outcome};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub amount: Option<Option<f64>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub time_spent_secs: Option<Option<u64>>,
}

impl CompletionPatch {
    pub fn is_empty(&self) -> bool {
        self.outcome.is_none() && self.amount.is_none() && self.time_spent_secs.is_none()
    }

    pub fn apply_to(&self, completion: &mut Completion) {
        if let Some(outcome) = self.outcome {
            completion.outcome = outcome;
        }
        if let Some(amount) = self.amount {
            completion.amount = amount;
        }
        if let Some(secs) = self.time_spent_secs {
            completion.time_spent_secs = secs;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArrangementPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ArrangementStatus>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub customer_name: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub notes: Option<Option<String>>,
}

impl ArrangementPatch {
    pub fn is_empty(&self) -> bool {
        self.amount.is_none()
            && self.scheduled_date.is_none()
            && self.status.is_none()
            && self.customer_name.is_none()
            && self.notes.is_none()
    }

    pub fn apply_to(&self, arrangement: &mut Arrangement, at: DateTime<Utc>) {
        if let Some(amount) = self.amount {
            arrangement.amount = amount;
        }
        if let Some(date) = self.scheduled_date {
            arrangement.scheduled_date = date;
        }
        if let Some(status) = self.status {
            arrangement.status = status;
        }
        if let Some(ref name) = self.customer_name {
            arrangement.customer_name = name.clone();
        }
        if let Some(ref notes) = self.notes {
            arrangement.notes = notes.clone();
        }
        arrangement.updated_at = at;
    }
}

/// Distinguishes an absent field (`None`) from an explicit `null` (`Some(None)`).
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
