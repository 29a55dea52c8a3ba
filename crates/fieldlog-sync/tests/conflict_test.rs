//! Concurrent edits across devices: detection, the four resolutions, and
//! convergence of resolved entities.

use std::sync::Arc;

use chrono::Duration;
use serde_json::{json, Map, Value};

use fieldlog_core::errors::{ConflictError, FieldlogError};
use fieldlog_core::models::{
    CompletionPatch, ConflictResolution, ConflictStatus, OperationKind, Outcome, VersionConflict,
};
use fieldlog_core::FieldlogConfig;
use fieldlog_storage::StorageEngine;
use fieldlog_sync::SyncEngine;
use test_fixtures::{addresses, base_time, completion, ManualClock, MockRemoteStore};

// ─── Helpers ───────────────────────────────────────────────

type Engine = SyncEngine<MockRemoteStore>;

async fn device(remote: &Arc<MockRemoteStore>) -> (Engine, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::default());
    let engine = SyncEngine::open(
        Arc::new(StorageEngine::open_in_memory().unwrap()),
        Arc::clone(remote),
        clock.clone(),
        FieldlogConfig::default(),
    )
    .await
    .unwrap();
    (engine, clock)
}

fn set_amount(id: &str, amount: f64) -> OperationKind {
    OperationKind::CompletionUpdate {
        id: id.to_string(),
        changes: CompletionPatch {
            amount: Some(Some(amount)),
            ..CompletionPatch::default()
        },
        expected_version: 0,
    }
}

/// A and B share `c1` at version 1. A edits it offline, B edits it online,
/// then both sync. Each side ends up with one pending conflict.
async fn concurrent_update() -> (Arc<MockRemoteStore>, Engine, Engine) {
    let remote = Arc::new(MockRemoteStore::new());
    let (a, _) = device(&remote).await;
    let (b, _) = device(&remote).await;

    a.submit_operation(OperationKind::AddressesSet {
        addresses: addresses(3),
        list_version: 1,
    })
    .await;
    a.submit_operation(OperationKind::CompletionCreate {
        completion: completion("c1", 0, base_time()),
    })
    .await;
    b.sync().await.unwrap();

    a.set_online(false);
    assert!(a.submit_operation(set_amount("c1", 10.0)).await.queued);
    assert!(b.submit_operation(set_amount("c1", 20.0)).await.success);

    a.set_online(true);
    let a_report = a.sync().await.unwrap();
    assert_eq!(a_report.pushed, 1);
    assert_eq!(a_report.merge.conflicts_detected, 1);
    let b_report = b.sync().await.unwrap();
    assert_eq!(b_report.merge.conflicts_detected, 1);

    (remote, a, b)
}

async fn only_conflict(engine: &Engine) -> VersionConflict {
    let mut pending = engine.pending_conflicts().await.unwrap();
    assert_eq!(pending.len(), 1);
    pending.remove(0)
}

fn amount_of(state: &fieldlog_core::AppState, id: &str) -> Option<f64> {
    state.completion(id).and_then(|c| c.amount)
}

// ─── Detection ─────────────────────────────────────────────

#[tokio::test]
async fn concurrent_updates_leave_local_data_alone() {
    let (_remote, a, b) = concurrent_update().await;

    let conflict = only_conflict(&a).await;
    assert_eq!(conflict.entity_id, "c1");
    assert_eq!(conflict.current_version, 2);
    assert_eq!(conflict.expected_version, 1);
    assert_eq!(conflict.remote_client_id, b.client_id());
    assert_eq!(conflict.remote_data, json!({ "amount": 20.0 }));
    assert_eq!(amount_of(&a.confirmed_state().await, "c1"), Some(10.0));
    assert_eq!(amount_of(&b.confirmed_state().await, "c1"), Some(20.0));
}

#[tokio::test]
async fn same_id_create_with_different_content_conflicts() {
    let remote = Arc::new(MockRemoteStore::new());
    let (a, _) = device(&remote).await;
    let (b, _) = device(&remote).await;
    a.submit_operation(OperationKind::AddressesSet {
        addresses: addresses(3),
        list_version: 1,
    })
    .await;
    b.sync().await.unwrap();

    a.submit_operation(OperationKind::CompletionCreate {
        completion: completion("c1", 0, base_time()),
    })
    .await;
    b.submit_operation(OperationKind::CompletionCreate {
        completion: completion("c1", 1, base_time()),
    })
    .await;

    let report = b.sync().await.unwrap();
    assert_eq!(report.merge.conflicts_detected, 1);
    let conflict = only_conflict(&b).await;
    assert_eq!(conflict.expected_version, 0);
    assert_eq!(conflict.current_version, 1);
    assert_eq!(b.confirmed_state().await.completion("c1").unwrap().index, 1);
}

#[tokio::test]
async fn identical_create_is_not_a_conflict() {
    let remote = Arc::new(MockRemoteStore::new());
    let (a, _) = device(&remote).await;
    let (b, _) = device(&remote).await;
    a.submit_operation(OperationKind::AddressesSet {
        addresses: addresses(3),
        list_version: 1,
    })
    .await;
    b.sync().await.unwrap();

    let same = completion("c1", 0, base_time());
    a.submit_operation(OperationKind::CompletionCreate {
        completion: same.clone(),
    })
    .await;
    b.submit_operation(OperationKind::CompletionCreate { completion: same })
        .await;

    let report = b.sync().await.unwrap();
    assert_eq!(report.merge.conflicts_detected, 0);
    assert_eq!(report.merge.already_applied, 1);
    assert!(b.pending_conflicts().await.unwrap().is_empty());
}

// ─── Resolution ────────────────────────────────────────────

#[tokio::test]
async fn use_remote_applies_once_and_converges() {
    let (remote, a, b) = concurrent_update().await;
    let conflict = only_conflict(&a).await;

    let outcome = a.resolve_use_remote(&conflict.id).await.unwrap();
    assert!(outcome.success);

    let resolved = a.confirmed_state().await;
    let c1 = resolved.completion("c1").unwrap();
    assert_eq!(c1.amount, Some(20.0));
    assert_eq!(c1.version, 3);

    let again = a.resolve_use_remote(&conflict.id).await;
    assert!(matches!(
        again,
        Err(FieldlogError::ConflictError(ConflictError::NotPending { .. }))
    ));
    let closed = a.conflict(&conflict.id).await.unwrap().unwrap();
    assert_eq!(closed.status, ConflictStatus::Resolved);
    assert_eq!(closed.resolution, Some(ConflictResolution::UseRemote));

    // B replays the resolution, lands on the same entity, and its own
    // conflict over the same edit is closed with it.
    let report = b.sync().await.unwrap();
    assert_eq!(report.merge.applied, 1);
    assert_eq!(report.merge.conflicts_settled, 1);
    assert_eq!(
        b.confirmed_state().await.completion("c1"),
        resolved.completion("c1")
    );
    assert!(b.pending_conflicts().await.unwrap().is_empty());
    let settled = b.resolved_conflicts().await.unwrap();
    assert_eq!(settled.len(), 1);
    assert_eq!(settled[0].resolution, Some(ConflictResolution::UseRemote));

    // So does a device that starts from scratch.
    let (c, _) = device(&remote).await;
    c.sync().await.unwrap();
    assert_eq!(
        c.confirmed_state().await.completion("c1"),
        resolved.completion("c1")
    );
}

#[tokio::test]
async fn replayed_history_leaves_no_conflict_to_resolve() {
    let (remote, a, _b) = concurrent_update().await;
    let conflict = only_conflict(&a).await;
    a.resolve_use_remote(&conflict.id).await.unwrap();
    let agreed = a.confirmed_state().await.completion("c1").cloned();

    // A fresh device sees the losing edit as stale, then the resolution
    // that settled it, in the same batch.
    let (c, _) = device(&remote).await;
    let report = c.sync().await.unwrap();
    assert_eq!(report.merge.conflicts_detected, 1);
    assert_eq!(report.merge.conflicts_settled, 1);
    assert!(c.pending_conflicts().await.unwrap().is_empty());
    assert_eq!(c.confirmed_state().await.completion("c1").cloned(), agreed);

    // Nothing left for C to overwrite the agreed entity with.
    let submits = remote.submit_calls();
    c.sync().await.unwrap();
    assert_eq!(remote.submit_calls(), submits);
    assert_eq!(a.sync().await.unwrap().merge.applied, 0);
    assert_eq!(a.confirmed_state().await.completion("c1").cloned(), agreed);
}

#[tokio::test]
async fn kept_local_edit_leaves_other_devices_to_decide() {
    let (_remote, a, b) = concurrent_update().await;
    let conflict = only_conflict(&a).await;
    a.resolve_keep_local(&conflict.id).await.unwrap();

    // Keep-local publishes nothing, so B's conflict is still its own call.
    let report = b.sync().await.unwrap();
    assert_eq!(report.merge.conflicts_settled, 0);
    assert_eq!(b.pending_conflicts().await.unwrap().len(), 1);
}

#[tokio::test]
async fn keep_local_changes_only_the_conflict_record() {
    let (remote, a, _b) = concurrent_update().await;
    let conflict = only_conflict(&a).await;
    let before = a.confirmed_state().await;
    let submits = remote.submit_calls();

    a.resolve_keep_local(&conflict.id).await.unwrap();

    assert_eq!(a.confirmed_state().await, before);
    assert_eq!(remote.submit_calls(), submits);
    let closed = a.conflict(&conflict.id).await.unwrap().unwrap();
    assert_eq!(closed.resolution, Some(ConflictResolution::KeepLocal));
    assert!(a.pending_conflicts().await.unwrap().is_empty());
    assert_eq!(a.resolved_conflicts().await.unwrap().len(), 1);
}

#[tokio::test]
async fn manual_resolution_merges_chosen_fields() {
    let (_remote, a, _b) = concurrent_update().await;
    let conflict = only_conflict(&a).await;

    let mut fields = Map::new();
    fields.insert("outcome".to_string(), serde_json::to_value(Outcome::Pif).unwrap());
    fields.insert("amount".to_string(), Value::from(15.0));
    // Identity is not negotiable.
    fields.insert("id".to_string(), Value::from("other"));
    a.resolve_manual(&conflict.id, fields).await.unwrap();

    let state = a.confirmed_state().await;
    let c1 = state.completion("c1").unwrap();
    assert_eq!(c1.outcome, Outcome::Pif);
    assert_eq!(c1.amount, Some(15.0));
    assert_eq!(c1.version, 3);
    assert!(state.completion("other").is_none());
}

#[tokio::test]
async fn invalid_manual_fields_leave_the_conflict_open() {
    let (_remote, a, _b) = concurrent_update().await;
    let conflict = only_conflict(&a).await;
    let before = a.confirmed_state().await;

    let mut fields = Map::new();
    fields.insert("amount".to_string(), Value::from(-5.0));
    let result = a.resolve_manual(&conflict.id, fields).await;

    assert!(matches!(
        result,
        Err(FieldlogError::ConflictError(ConflictError::MergeFailed { .. }))
    ));
    assert_eq!(a.confirmed_state().await, before);
    assert_eq!(only_conflict(&a).await.id, conflict.id);
}

#[tokio::test]
async fn missing_local_data_blocks_resolution_but_not_dismissal() {
    let (_remote, _a, b) = concurrent_update().await;
    let conflict = only_conflict(&b).await;

    b.submit_operation(OperationKind::CompletionDelete {
        id: "c1".to_string(),
    })
    .await;

    let result = b.resolve_use_remote(&conflict.id).await;
    assert!(matches!(
        result,
        Err(FieldlogError::ConflictError(ConflictError::LocalDataMissing { .. }))
    ));
    let result = b.resolve_keep_local(&conflict.id).await;
    assert!(matches!(
        result,
        Err(FieldlogError::ConflictError(ConflictError::LocalDataMissing { .. }))
    ));

    b.dismiss_conflict(&conflict.id).await.unwrap();
    let closed = b.conflict(&conflict.id).await.unwrap().unwrap();
    assert_eq!(closed.status, ConflictStatus::Dismissed);
    assert_eq!(closed.resolution, None);
}

#[tokio::test]
async fn unknown_conflict_is_not_found() {
    let remote = Arc::new(MockRemoteStore::new());
    let (a, _) = device(&remote).await;

    let result = a.dismiss_conflict("nope").await;
    assert!(matches!(
        result,
        Err(FieldlogError::ConflictError(ConflictError::NotFound { .. }))
    ));
}

// ─── Retention ─────────────────────────────────────────────

#[tokio::test]
async fn stale_conflicts_are_dismissed_then_purged() {
    let remote = Arc::new(MockRemoteStore::new());
    let (a, _) = device(&remote).await;
    let (b, b_clock) = device(&remote).await;
    a.submit_operation(OperationKind::AddressesSet {
        addresses: addresses(3),
        list_version: 1,
    })
    .await;
    b.sync().await.unwrap();
    a.submit_operation(OperationKind::CompletionCreate {
        completion: completion("c1", 0, base_time()),
    })
    .await;
    b.submit_operation(OperationKind::CompletionCreate {
        completion: completion("c1", 1, base_time()),
    })
    .await;
    b.sync().await.unwrap();
    assert_eq!(b.pending_conflicts().await.unwrap().len(), 1);

    b_clock.advance(Duration::days(6));
    assert_eq!(b.run_maintenance().await.unwrap().conflicts_dismissed, 0);

    b_clock.advance(Duration::days(2));
    let report = b.run_maintenance().await.unwrap();
    assert_eq!(report.conflicts_dismissed, 1);
    assert!(b.pending_conflicts().await.unwrap().is_empty());

    b_clock.advance(Duration::hours(25));
    let report = b.run_maintenance().await.unwrap();
    assert_eq!(report.conflicts_purged, 1);
    assert!(b.resolved_conflicts().await.unwrap().is_empty());
}
