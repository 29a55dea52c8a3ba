//! Folds one operation into `AppState`.
//!
//! Pure and deterministic: the same operation applied to the same state
//! yields the same result on every device. Local submissions surface
//! `Err` as validation failures; the merge path treats `Err` as a skip.

use chrono::{DateTime, Duration, Utc};

use crate::constants::COMPLETION_DEDUPE_WINDOW_MS;
use crate::errors::{FieldlogError, FieldlogResult};
use crate::models::{AppState, Completion, EntityData, OperationKind};
use crate::validation::{validate_arrangement, validate_completion, validate_session};

#[derive(Debug, Clone, Copy)]
pub struct ReducerSettings {
    pub completion_dedupe_window_ms: i64,
}

impl Default for ReducerSettings {
    fn default() -> Self {
        Self {
            completion_dedupe_window_ms: COMPLETION_DEDUPE_WINDOW_MS,
        }
    }
}

/// What applying an operation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Applied,
    /// A completion for the same address inside the dedupe window exists.
    Duplicate,
    /// Nothing to do; the reason is for logs.
    NoOp(&'static str),
}

fn invalid(message: impl Into<String>) -> FieldlogError {
    FieldlogError::ValidationError(message.into())
}

/// An existing completion that makes `candidate` a duplicate, if any.
pub fn find_duplicate_completion<'a>(
    state: &'a AppState,
    candidate: &Completion,
    window_ms: i64,
) -> Option<&'a Completion> {
    let window = Duration::milliseconds(window_ms);
    state.completions.iter().find(|existing| {
        existing.id != candidate.id
            && existing.index == candidate.index
            && existing.list_version == candidate.list_version
            && (existing.timestamp - candidate.timestamp).abs() < window
    })
}

pub fn apply(
    state: &mut AppState,
    kind: &OperationKind,
    at: DateTime<Utc>,
    settings: &ReducerSettings,
) -> FieldlogResult<Applied> {
    match kind {
        OperationKind::CompletionCreate { completion } => {
            validate_completion(completion).map_err(invalid)?;
            if completion.list_version == state.list_version
                && completion.index >= state.addresses.len()
            {
                return Err(invalid(format!(
                    "address index {} out of range ({} addresses)",
                    completion.index,
                    state.addresses.len()
                )));
            }
            if let Some(existing) = state.completion(&completion.id) {
                if existing.same_content(completion) {
                    return Ok(Applied::NoOp("completion already recorded"));
                }
                return Err(invalid(format!("completion {} already exists", completion.id)));
            }
            if find_duplicate_completion(
                state,
                completion,
                settings.completion_dedupe_window_ms,
            )
            .is_some()
            {
                return Ok(Applied::Duplicate);
            }
            let mut completion = completion.clone();
            completion.version = completion.version.max(1);
            state.completions.push(completion);
            Ok(Applied::Applied)
        }

        OperationKind::CompletionUpdate { id, changes, .. } => {
            if changes.is_empty() {
                return Ok(Applied::NoOp("empty completion patch"));
            }
            let Some(completion) = state.completions.iter_mut().find(|c| &c.id == id) else {
                return Ok(Applied::NoOp("unknown completion"));
            };
            let mut updated = completion.clone();
            changes.apply_to(&mut updated);
            validate_completion(&updated).map_err(invalid)?;
            updated.version = completion.version + 1;
            *completion = updated;
            Ok(Applied::Applied)
        }

        OperationKind::CompletionDelete { id } => {
            let before = state.completions.len();
            state.completions.retain(|c| &c.id != id);
            if state.completions.len() == before {
                Ok(Applied::NoOp("unknown completion"))
            } else {
                Ok(Applied::Applied)
            }
        }

        OperationKind::ArrangementCreate { arrangement } => {
            validate_arrangement(arrangement).map_err(invalid)?;
            if let Some(existing) = state.arrangement(&arrangement.id) {
                if existing.same_content(arrangement) {
                    return Ok(Applied::NoOp("arrangement already recorded"));
                }
                return Err(invalid(format!(
                    "arrangement {} already exists",
                    arrangement.id
                )));
            }
            let mut arrangement = arrangement.clone();
            arrangement.version = arrangement.version.max(1);
            state.arrangements.push(arrangement);
            Ok(Applied::Applied)
        }

        OperationKind::ArrangementUpdate { id, changes, .. } => {
            if changes.is_empty() {
                return Ok(Applied::NoOp("empty arrangement patch"));
            }
            let Some(arrangement) = state.arrangements.iter_mut().find(|a| &a.id == id) else {
                return Ok(Applied::NoOp("unknown arrangement"));
            };
            let mut updated = arrangement.clone();
            changes.apply_to(&mut updated, at);
            validate_arrangement(&updated).map_err(invalid)?;
            updated.version = arrangement.version + 1;
            *arrangement = updated;
            Ok(Applied::Applied)
        }

        OperationKind::ArrangementDelete { id } => {
            let before = state.arrangements.len();
            state.arrangements.retain(|a| &a.id != id);
            if state.arrangements.len() == before {
                Ok(Applied::NoOp("unknown arrangement"))
            } else {
                Ok(Applied::Applied)
            }
        }

        OperationKind::AddressesSet {
            addresses,
            list_version,
        } => {
            if *list_version < state.list_version {
                return Ok(Applied::NoOp("stale address list"));
            }
            if addresses.iter().any(|a| a.address.trim().is_empty()) {
                return Err(invalid("address list contains an empty address"));
            }
            state.addresses = addresses.clone();
            state.list_version = *list_version;
            state.active_index = None;
            state.active_start_time = None;
            Ok(Applied::Applied)
        }

        OperationKind::AddressAdd { address } => {
            if address.address.trim().is_empty() {
                return Err(invalid("address is empty"));
            }
            state.addresses.push(address.clone());
            Ok(Applied::Applied)
        }

        OperationKind::ActiveIndexSet { index, start_time } => {
            if let Some(i) = index {
                if *i >= state.addresses.len() {
                    return Err(invalid(format!(
                        "active index {i} out of range ({} addresses)",
                        state.addresses.len()
                    )));
                }
            }
            if state.active_index == *index && state.active_start_time == *start_time {
                return Ok(Applied::NoOp("active index unchanged"));
            }
            state.active_index = *index;
            state.active_start_time = if index.is_some() { *start_time } else { None };
            Ok(Applied::Applied)
        }

        OperationKind::SessionStart { session } => {
            validate_session(session).map_err(invalid)?;
            if state.session(session.date).is_some() {
                return Ok(Applied::NoOp("session already started"));
            }
            state.day_sessions.push(session.clone());
            Ok(Applied::Applied)
        }

        OperationKind::SessionEnd { date, end_time } => {
            let Some(session) = state.day_sessions.iter_mut().find(|s| s.date == *date) else {
                return Ok(Applied::NoOp("unknown session"));
            };
            if *end_time < session.start {
                return Err(invalid(format!("session {date} would end before it starts")));
            }
            if session.end == Some(*end_time) {
                return Ok(Applied::NoOp("session already ended"));
            }
            session.end = Some(*end_time);
            session.duration_secs = Some((*end_time - session.start).num_seconds());
            Ok(Applied::Applied)
        }

        OperationKind::ConflictResolve {
            resulting_version,
            resulting,
            ..
        } => apply_resolution(state, resulting, *resulting_version),
    }
}

/// Version-gated upsert: a replayed resolution is a no-op once the local
/// entity is at or past the resolved version.
fn apply_resolution(
    state: &mut AppState,
    resulting: &EntityData,
    resulting_version: u64,
) -> FieldlogResult<Applied> {
    let id = resulting.entity_id();
    let local_version = match resulting {
        EntityData::Completion(_) => state.completion(&id).map(|c| c.version),
        EntityData::Arrangement(_) => state.arrangement(&id).map(|a| a.version),
        EntityData::Session(_) => None,
    };
    if local_version.is_some_and(|v| v >= resulting_version) {
        return Ok(Applied::NoOp("resolution already applied"));
    }
    let mut entity = resulting.clone();
    match &mut entity {
        EntityData::Completion(c) => {
            validate_completion(c).map_err(invalid)?;
            c.version = resulting_version;
        }
        EntityData::Arrangement(a) => {
            validate_arrangement(a).map_err(invalid)?;
            a.version = resulting_version;
        }
        EntityData::Session(s) => validate_session(s).map_err(invalid)?,
    }
    state.upsert(entity);
    Ok(Applied::Applied)
}
