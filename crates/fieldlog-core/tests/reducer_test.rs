//! Reducer tests: completion dedupe, versioned updates, list edits,
//! sessions, and version-gated conflict resolutions.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};

use fieldlog_core::errors::FieldlogError;
use fieldlog_core::models::*;
use fieldlog_core::reducer::{apply, find_duplicate_completion, Applied, ReducerSettings};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 14, 9, 0, 0).unwrap()
}

fn state_with_addresses(n: usize) -> AppState {
    AppState {
        addresses: (0..n).map(|i| Address::new(format!("{i} High Street"))).collect(),
        ..AppState::default()
    }
}

fn completion(id: &str, index: usize, at: DateTime<Utc>) -> Completion {
    Completion {
        id: id.to_string(),
        index,
        address: format!("{index} High Street"),
        outcome: Outcome::Done,
        amount: None,
        timestamp: at,
        list_version: 1,
        time_spent_secs: None,
        version: 1,
    }
}

fn arrangement(id: &str) -> Arrangement {
    Arrangement {
        id: id.to_string(),
        address_index: 0,
        address: "0 High Street".to_string(),
        customer_name: Some("J. Smith".to_string()),
        amount: 120.0,
        scheduled_date: NaiveDate::from_ymd_opt(2025, 3, 21).unwrap(),
        status: ArrangementStatus::Scheduled,
        notes: None,
        created_at: t0(),
        updated_at: t0(),
        version: 1,
    }
}

fn create(c: Completion) -> OperationKind {
    OperationKind::CompletionCreate { completion: c }
}

// ── Completion dedupe ─────────────────────────────────────────────────────

#[test]
fn second_completion_within_window_is_duplicate() {
    let mut state = state_with_addresses(3);
    let settings = ReducerSettings::default();

    let first = apply(&mut state, &create(completion("c1", 0, t0())), t0(), &settings).unwrap();
    let second_at = t0() + Duration::seconds(3);
    let second = apply(
        &mut state,
        &create(completion("c2", 0, second_at)),
        second_at,
        &settings,
    )
    .unwrap();

    assert_eq!(first, Applied::Applied);
    assert_eq!(second, Applied::Duplicate);
    assert_eq!(state.completions.len(), 1);
    assert_eq!(state.completions[0].id, "c1");
}

#[test]
fn completion_outside_window_is_kept() {
    let mut state = state_with_addresses(3);
    let settings = ReducerSettings::default();

    apply(&mut state, &create(completion("c1", 0, t0())), t0(), &settings).unwrap();
    let later = t0() + Duration::seconds(6);
    let result = apply(&mut state, &create(completion("c2", 0, later)), later, &settings).unwrap();

    assert_eq!(result, Applied::Applied);
    assert_eq!(state.completions.len(), 2);
}

#[test]
fn different_list_version_is_not_a_duplicate() {
    let mut state = state_with_addresses(3);
    let settings = ReducerSettings::default();

    apply(&mut state, &create(completion("c1", 0, t0())), t0(), &settings).unwrap();
    let mut other_list = completion("c2", 0, t0());
    other_list.list_version = 0;
    let result = apply(&mut state, &create(other_list), t0(), &settings).unwrap();

    assert_eq!(result, Applied::Applied);
}

#[test]
fn find_duplicate_ignores_the_same_id() {
    let mut state = state_with_addresses(1);
    state.completions.push(completion("c1", 0, t0()));
    assert!(find_duplicate_completion(&state, &completion("c1", 0, t0()), 5_000).is_none());
}

#[test]
fn identical_create_is_idempotent_and_divergent_create_fails() {
    let mut state = state_with_addresses(2);
    let settings = ReducerSettings::default();
    let c = completion("c1", 1, t0());

    apply(&mut state, &create(c.clone()), t0(), &settings).unwrap();
    let again = apply(&mut state, &create(c.clone()), t0(), &settings).unwrap();
    assert!(matches!(again, Applied::NoOp(_)));

    let mut divergent = c;
    divergent.outcome = Outcome::Pif;
    let err = apply(&mut state, &create(divergent), t0(), &settings).unwrap_err();
    assert!(matches!(err, FieldlogError::ValidationError(_)));
}

#[test]
fn completion_index_out_of_range_rejected() {
    let mut state = state_with_addresses(2);
    let err = apply(
        &mut state,
        &create(completion("c1", 5, t0())),
        t0(),
        &ReducerSettings::default(),
    )
    .unwrap_err();
    assert!(matches!(err, FieldlogError::ValidationError(_)));
    assert!(state.completions.is_empty());
}

#[test]
fn negative_amount_rejected() {
    let mut state = state_with_addresses(1);
    let mut c = completion("c1", 0, t0());
    c.amount = Some(-5.0);
    assert!(apply(&mut state, &create(c), t0(), &ReducerSettings::default()).is_err());
}

// ── Updates and deletes ───────────────────────────────────────────────────

#[test]
fn update_bumps_version_and_applies_patch() {
    let mut state = state_with_addresses(1);
    state.completions.push(completion("c1", 0, t0()));

    let op = OperationKind::CompletionUpdate {
        id: "c1".to_string(),
        changes: CompletionPatch {
            outcome: Some(Outcome::Pif),
            amount: Some(Some(50.0)),
            time_spent_secs: None,
        },
        expected_version: 1,
    };
    let result = apply(&mut state, &op, t0(), &ReducerSettings::default()).unwrap();

    assert_eq!(result, Applied::Applied);
    let c = state.completion("c1").unwrap();
    assert_eq!(c.outcome, Outcome::Pif);
    assert_eq!(c.amount, Some(50.0));
    assert_eq!(c.version, 2);
}

#[test]
fn empty_patch_and_unknown_entity_are_noops() {
    let mut state = state_with_addresses(1);
    state.completions.push(completion("c1", 0, t0()));
    let settings = ReducerSettings::default();

    let empty = OperationKind::CompletionUpdate {
        id: "c1".to_string(),
        changes: CompletionPatch::default(),
        expected_version: 1,
    };
    assert!(matches!(apply(&mut state, &empty, t0(), &settings).unwrap(), Applied::NoOp(_)));

    let unknown = OperationKind::CompletionDelete { id: "nope".to_string() };
    assert!(matches!(apply(&mut state, &unknown, t0(), &settings).unwrap(), Applied::NoOp(_)));
    assert_eq!(state.completion("c1").unwrap().version, 1);
}

#[test]
fn arrangement_update_stamps_operation_time() {
    let mut state = state_with_addresses(1);
    state.arrangements.push(arrangement("a1"));
    let at = t0() + Duration::hours(2);

    let op = OperationKind::ArrangementUpdate {
        id: "a1".to_string(),
        changes: ArrangementPatch {
            status: Some(ArrangementStatus::Completed),
            notes: Some(Some("paid at door".to_string())),
            ..ArrangementPatch::default()
        },
        expected_version: 1,
    };
    apply(&mut state, &op, at, &ReducerSettings::default()).unwrap();

    let a = state.arrangement("a1").unwrap();
    assert_eq!(a.status, ArrangementStatus::Completed);
    assert_eq!(a.notes.as_deref(), Some("paid at door"));
    assert_eq!(a.updated_at, at);
    assert_eq!(a.version, 2);
}

// ── Address list and active index ─────────────────────────────────────────

#[test]
fn stale_address_list_ignored() {
    let mut state = state_with_addresses(2);
    state.list_version = 3;
    let op = OperationKind::AddressesSet {
        addresses: vec![Address::new("elsewhere")],
        list_version: 2,
    };
    let result = apply(&mut state, &op, t0(), &ReducerSettings::default()).unwrap();
    assert!(matches!(result, Applied::NoOp(_)));
    assert_eq!(state.addresses.len(), 2);
}

#[test]
fn new_address_list_clears_active_index() {
    let mut state = state_with_addresses(2);
    state.active_index = Some(1);
    state.active_start_time = Some(t0());
    let op = OperationKind::AddressesSet {
        addresses: vec![Address::new("1 New Road")],
        list_version: 2,
    };
    apply(&mut state, &op, t0(), &ReducerSettings::default()).unwrap();
    assert_eq!(state.list_version, 2);
    assert_eq!(state.active_index, None);
    assert_eq!(state.active_start_time, None);
}

#[test]
fn active_index_out_of_range_rejected() {
    let mut state = state_with_addresses(2);
    let op = OperationKind::ActiveIndexSet {
        index: Some(2),
        start_time: Some(t0()),
    };
    assert!(apply(&mut state, &op, t0(), &ReducerSettings::default()).is_err());
    assert_eq!(state.active_index, None);
}

// ── Sessions ──────────────────────────────────────────────────────────────

#[test]
fn session_end_before_start_rejected() {
    let mut state = AppState::default();
    let date = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();
    let settings = ReducerSettings::default();
    let start = OperationKind::SessionStart {
        session: DaySession {
            date,
            start: t0(),
            end: None,
            duration_secs: None,
        },
    };
    apply(&mut state, &start, t0(), &settings).unwrap();

    let bad_end = OperationKind::SessionEnd {
        date,
        end_time: t0() - Duration::minutes(1),
    };
    assert!(apply(&mut state, &bad_end, t0(), &settings).is_err());

    let end = OperationKind::SessionEnd {
        date,
        end_time: t0() + Duration::hours(8),
    };
    apply(&mut state, &end, t0(), &settings).unwrap();
    assert_eq!(state.session(date).unwrap().duration_secs, Some(8 * 3600));
}

// ── Conflict resolution records ───────────────────────────────────────────

#[test]
fn resolution_replay_is_version_gated() {
    let mut state = state_with_addresses(1);
    state.arrangements.push(arrangement("a1"));
    let mut resolved = arrangement("a1");
    resolved.amount = 80.0;

    let op = OperationKind::ConflictResolve {
        conflict_id: "k1".to_string(),
        resolution: ConflictResolution::UseRemote,
        resulting_version: 3,
        resulting: EntityData::Arrangement(resolved),
    };
    let settings = ReducerSettings::default();

    assert_eq!(apply(&mut state, &op, t0(), &settings).unwrap(), Applied::Applied);
    assert_eq!(state.arrangement("a1").unwrap().version, 3);
    assert_eq!(state.arrangement("a1").unwrap().amount, 80.0);

    let replay = apply(&mut state, &op, t0(), &settings).unwrap();
    assert!(matches!(replay, Applied::NoOp(_)));
    assert_eq!(state.arrangements.len(), 1);
}
