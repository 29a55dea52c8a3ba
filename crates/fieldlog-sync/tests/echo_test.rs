//! Echo filter layers over tracked changes.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::json;

use fieldlog_core::config::EchoConfig;
use fieldlog_core::models::{
    CompletionPatch, Operation, OperationKind, RemoteRow, SubmitReceipt,
};
use fieldlog_core::Clock;
use fieldlog_storage::StorageEngine;
use fieldlog_sync::echo::{ChangeTracker, EchoFilter, EchoReason, EchoVerdict};
use test_fixtures::{base_time, completion, ManualClock};

// ─── Helpers ───────────────────────────────────────────────

const LOCAL: &str = "device-a";

struct Harness {
    clock: Arc<ManualClock>,
    tracker: Arc<ChangeTracker>,
    filter: EchoFilter,
}

fn harness() -> Harness {
    let storage = Arc::new(StorageEngine::open_in_memory().unwrap());
    let clock = Arc::new(ManualClock::default());
    let dyn_clock: Arc<dyn Clock> = clock.clone();
    let tracker = Arc::new(ChangeTracker::new(storage, dyn_clock, 300_000));
    let filter = EchoFilter::new(Arc::clone(&tracker), LOCAL.to_string(), EchoConfig::default());
    Harness {
        clock,
        tracker,
        filter,
    }
}

fn create_c1() -> OperationKind {
    OperationKind::CompletionCreate {
        completion: completion("c1", 0, base_time()),
    }
}

fn operation(kind: OperationKind, client_id: &str) -> Operation {
    Operation {
        id: "op-1".to_string(),
        kind,
        timestamp: base_time(),
        client_id: client_id.to_string(),
        sequence: 1,
    }
}

/// Track `kind` as confirmed by the server at `base_time()`.
async fn track(h: &Harness, kind: OperationKind) {
    let receipt = SubmitReceipt {
        operation_id: "op-1".to_string(),
        server_timestamp: base_time(),
    };
    h.tracker.track(&operation(kind, LOCAL), &receipt).await.unwrap();
}

/// A row from a store that records neither `updated_by` nor `client_id`.
fn anonymous_row(kind: &OperationKind, updated_at: DateTime<Utc>) -> RemoteRow {
    RemoteRow {
        entity: kind.entity_name().to_string(),
        id: kind.entity_id(),
        payload: json!({ "kind": serde_json::to_value(kind).unwrap() }),
        updated_at,
        updated_by: None,
        deleted_at: None,
    }
}

// ─── Device id ─────────────────────────────────────────────

#[tokio::test]
async fn own_device_id_is_an_echo() {
    let h = harness();
    let row = RemoteRow::from_operation(&operation(create_c1(), LOCAL), base_time()).unwrap();

    assert_eq!(
        h.filter.classify(&row).await.unwrap(),
        EchoVerdict::Echo(EchoReason::DeviceId)
    );
}

#[tokio::test]
async fn other_device_is_never_an_echo() {
    let h = harness();
    track(&h, create_c1()).await;
    // Same entity, same content, same server time: still another device's write.
    let row = RemoteRow::from_operation(&operation(create_c1(), "device-b"), base_time()).unwrap();

    assert_eq!(h.filter.classify(&row).await.unwrap(), EchoVerdict::NotEcho);
}

#[tokio::test]
async fn payload_client_id_stands_in_for_updated_by() {
    let h = harness();
    let mut row = RemoteRow::from_operation(&operation(create_c1(), LOCAL), base_time()).unwrap();
    row.updated_by = None;

    assert_eq!(
        h.filter.classify(&row).await.unwrap(),
        EchoVerdict::Echo(EchoReason::DeviceId)
    );
}

// ─── Fallback layers ───────────────────────────────────────

#[tokio::test]
async fn arrival_inside_the_window_is_an_echo() {
    let h = harness();
    track(&h, create_c1()).await;
    let changed = OperationKind::CompletionUpdate {
        id: "c1".to_string(),
        changes: CompletionPatch {
            amount: Some(Some(3.0)),
            ..CompletionPatch::default()
        },
        expected_version: 1,
    };

    let near = anonymous_row(&changed, base_time() + Duration::milliseconds(50));
    assert_eq!(
        h.filter.classify(&near).await.unwrap(),
        EchoVerdict::Echo(EchoReason::TimestampProximity)
    );

    let far = anonymous_row(&changed, base_time() + Duration::milliseconds(51));
    assert_eq!(h.filter.classify(&far).await.unwrap(), EchoVerdict::NotEcho);
}

#[tokio::test]
async fn matching_content_is_an_echo_outside_the_window() {
    let h = harness();
    track(&h, create_c1()).await;

    let row = anonymous_row(&create_c1(), base_time() + Duration::seconds(10));

    assert_eq!(
        h.filter.classify(&row).await.unwrap(),
        EchoVerdict::Echo(EchoReason::Checksum)
    );
}

#[tokio::test]
async fn checksum_is_scoped_to_the_entity() {
    let h = harness();
    track(&h, create_c1()).await;

    // Same content, reported under a different id.
    let mut row = anonymous_row(&create_c1(), base_time() + Duration::seconds(10));
    row.id = "c2".to_string();

    assert_eq!(h.filter.classify(&row).await.unwrap(), EchoVerdict::NotEcho);
}

#[tokio::test]
async fn nothing_tracked_means_no_echo() {
    let h = harness();
    let row = anonymous_row(&create_c1(), base_time());

    assert_eq!(h.filter.classify(&row).await.unwrap(), EchoVerdict::NotEcho);
}

#[tokio::test]
async fn pruned_changes_stop_matching() {
    let h = harness();
    track(&h, create_c1()).await;
    let row = anonymous_row(&create_c1(), base_time() + Duration::seconds(10));
    assert!(h.filter.classify(&row).await.unwrap().is_echo());

    h.clock.advance(Duration::minutes(6));
    assert_eq!(h.tracker.prune().await.unwrap(), 1);
    assert_eq!(h.filter.classify(&row).await.unwrap(), EchoVerdict::NotEcho);
}
