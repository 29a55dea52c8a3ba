//! Data written through one engine is visible after reopening the file.

use chrono::{TimeZone, Utc};

use fieldlog_core::models::*;
use fieldlog_storage::queries::{command_queue_ops, device_meta_ops};
use fieldlog_storage::StorageEngine;

fn item(n: u64) -> CommandQueueItem {
    CommandQueueItem {
        id: format!("q{n}"),
        operation: Operation {
            id: format!("op{n}"),
            kind: OperationKind::ArrangementDelete {
                id: format!("a{n}"),
            },
            timestamp: Utc.with_ymd_and_hms(2025, 5, 1, 12, 0, 0).unwrap(),
            client_id: "device-a".to_string(),
            sequence: n,
        },
        added_at: Utc.with_ymd_and_hms(2025, 5, 1, 12, 0, 0).unwrap(),
        status: QueueStatus::Pending,
        attempts: 0,
        last_attempt: None,
        error: None,
    }
}

#[tokio::test]
async fn queue_and_sequence_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fieldlog.db");

    {
        let engine = StorageEngine::open(&path).unwrap();
        engine
            .with_conn(|conn| {
                for n in 1..=3 {
                    command_queue_ops::insert_item(conn, &item(n))?;
                    device_meta_ops::next_sequence(conn)?;
                }
                Ok(())
            })
            .await
            .unwrap();
    }

    let engine = StorageEngine::open(&path).unwrap();
    let (ids, next) = engine
        .with_conn(|conn| {
            let items = command_queue_ops::next_pending(conn, 10)?;
            let next = device_meta_ops::next_sequence(conn)?;
            Ok((items.into_iter().map(|i| i.id).collect::<Vec<_>>(), next))
        })
        .await
        .unwrap();

    assert_eq!(ids, vec!["q1", "q2", "q3"]);
    assert_eq!(next, 4);
}
