//! Entity validation and load-time sanitizing. Invalid persisted entities
//! are dropped rather than failing startup.

use std::collections::HashSet;

use crate::models::{AppState, Arrangement, Completion, DaySession};

pub fn validate_completion(completion: &Completion) -> Result<(), String> {
    if completion.id.trim().is_empty() {
        return Err("completion id is empty".to_string());
    }
    if completion.address.trim().is_empty() {
        return Err(format!("completion {} has an empty address", completion.id));
    }
    if let Some(amount) = completion.amount {
        if !amount.is_finite() || amount < 0.0 {
            return Err(format!("completion {} has invalid amount {amount}", completion.id));
        }
    }
    Ok(())
}

pub fn validate_arrangement(arrangement: &Arrangement) -> Result<(), String> {
    if arrangement.id.trim().is_empty() {
        return Err("arrangement id is empty".to_string());
    }
    if arrangement.address.trim().is_empty() {
        return Err(format!("arrangement {} has an empty address", arrangement.id));
    }
    if !arrangement.amount.is_finite() || arrangement.amount < 0.0 {
        return Err(format!(
            "arrangement {} has invalid amount {}",
            arrangement.id, arrangement.amount
        ));
    }
    Ok(())
}

pub fn validate_session(session: &DaySession) -> Result<(), String> {
    if let Some(end) = session.end {
        if end < session.start {
            return Err(format!("session {} ends before it starts", session.date));
        }
    }
    Ok(())
}

/// What `sanitize` removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SanitizeReport {
    pub dropped_completions: usize,
    pub dropped_arrangements: usize,
    pub dropped_sessions: usize,
    pub cleared_active_index: bool,
}

impl SanitizeReport {
    pub fn is_clean(&self) -> bool {
        *self == SanitizeReport::default()
    }
}

/// Drop invalid and duplicate-id entities, clear a dangling active index.
pub fn sanitize(state: &mut AppState) -> SanitizeReport {
    let mut report = SanitizeReport::default();

    let mut seen = HashSet::new();
    let before = state.completions.len();
    state
        .completions
        .retain(|c| validate_completion(c).is_ok() && seen.insert(c.id.clone()));
    report.dropped_completions = before - state.completions.len();

    let mut seen = HashSet::new();
    let before = state.arrangements.len();
    state
        .arrangements
        .retain(|a| validate_arrangement(a).is_ok() && seen.insert(a.id.clone()));
    report.dropped_arrangements = before - state.arrangements.len();

    let mut seen = HashSet::new();
    let before = state.day_sessions.len();
    state
        .day_sessions
        .retain(|s| validate_session(s).is_ok() && seen.insert(s.date));
    report.dropped_sessions = before - state.day_sessions.len();

    if let Some(index) = state.active_index {
        if index >= state.addresses.len() {
            state.active_index = None;
            state.active_start_time = None;
            report.cleared_active_index = true;
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate, TimeZone, Utc};

    use super::*;
    use crate::models::{Address, Outcome};

    fn completion(id: &str) -> Completion {
        Completion {
            id: id.to_string(),
            index: 0,
            address: "1 Elm Row".to_string(),
            outcome: Outcome::Done,
            amount: None,
            timestamp: Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap(),
            list_version: 1,
            time_spent_secs: None,
            version: 1,
        }
    }

    #[test]
    fn sanitize_drops_invalid_and_duplicate_entities() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap();
        let mut bad_amount = completion("c3");
        bad_amount.amount = Some(f64::NAN);
        let mut state = AppState {
            addresses: vec![Address::new("1 Elm Row")],
            active_index: Some(4),
            completions: vec![completion("c1"), completion("c1"), completion(""), bad_amount],
            day_sessions: vec![DaySession {
                date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
                start,
                end: Some(start - Duration::hours(1)),
                duration_secs: None,
            }],
            ..AppState::default()
        };

        let report = sanitize(&mut state);

        assert_eq!(state.completions.len(), 1);
        assert_eq!(report.dropped_completions, 3);
        assert_eq!(report.dropped_sessions, 1);
        assert!(report.cleared_active_index);
        assert_eq!(state.active_index, None);
        assert!(!report.is_clean());
    }

    #[test]
    fn clean_state_reports_nothing() {
        let mut state = AppState::default();
        assert!(sanitize(&mut state).is_clean());
    }
}
