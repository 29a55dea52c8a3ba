//! Echo predicates. Each layer is independent; the filter combines them.

use chrono::Duration;

use fieldlog_core::models::{RemoteRow, TrackedChange};

/// What the row says about its origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceMatch {
    /// Written by this device.
    Local,
    /// Written by another device. Definitive: no fallback applies.
    Other,
    /// The row carries no device id.
    Unknown,
}

/// The device id a row carries: `updated_by`, else the payload's `client_id`.
pub fn row_device_id(row: &RemoteRow) -> Option<&str> {
    row.updated_by
        .as_deref()
        .or_else(|| row.payload.get("client_id").and_then(|v| v.as_str()))
        .filter(|id| !id.is_empty())
}

pub fn device_match(row: &RemoteRow, local_device_id: &str) -> DeviceMatch {
    match row_device_id(row) {
        Some(id) if id == local_device_id => DeviceMatch::Local,
        Some(_) => DeviceMatch::Other,
        None => DeviceMatch::Unknown,
    }
}

/// The row's server time falls within `window_ms` of a tracked change to
/// the same entity.
pub fn timestamp_match(row: &RemoteRow, changes: &[TrackedChange], window_ms: i64) -> bool {
    let window = Duration::milliseconds(window_ms);
    changes.iter().any(|change| {
        change.entity == row.entity
            && change.entity_id == row.id
            && (row.updated_at - change.timestamp).abs() <= window
    })
}

/// The row's payload checksum equals a tracked change's checksum for the
/// same entity. Matches across different entities are not accepted.
pub fn checksum_match(row: &RemoteRow, row_checksum: &str, changes: &[TrackedChange]) -> bool {
    changes.iter().any(|change| {
        change.entity == row.entity && change.entity_id == row.id && change.checksum == row_checksum
    })
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use super::*;

    fn row(updated_by: Option<&str>) -> RemoteRow {
        RemoteRow {
            entity: "completion".to_string(),
            id: "c1".to_string(),
            payload: json!({ "client_id": "payload-device" }),
            updated_at: Utc.with_ymd_and_hms(2025, 6, 2, 8, 0, 0).unwrap(),
            updated_by: updated_by.map(str::to_string),
            deleted_at: None,
        }
    }

    fn change(entity_id: &str, offset_ms: i64, checksum: &str) -> TrackedChange {
        let at = Utc.with_ymd_and_hms(2025, 6, 2, 8, 0, 0).unwrap();
        TrackedChange {
            entity: "completion".to_string(),
            entity_id: entity_id.to_string(),
            operation_id: "op".to_string(),
            device_id: "me".to_string(),
            timestamp: at + Duration::milliseconds(offset_ms),
            checksum: checksum.to_string(),
            tracked_at: at,
        }
    }

    #[test]
    fn updated_by_wins_over_payload() {
        assert_eq!(device_match(&row(Some("me")), "me"), DeviceMatch::Local);
        assert_eq!(device_match(&row(Some("other")), "me"), DeviceMatch::Other);
        assert_eq!(device_match(&row(None), "payload-device"), DeviceMatch::Local);
    }

    #[test]
    fn missing_device_is_unknown() {
        let mut r = row(None);
        r.payload = json!({});
        assert_eq!(device_match(&r, "me"), DeviceMatch::Unknown);
    }

    #[test]
    fn timestamp_window_is_inclusive_and_entity_scoped() {
        let r = row(None);
        assert!(timestamp_match(&r, &[change("c1", 50, "x")], 50));
        assert!(!timestamp_match(&r, &[change("c1", 51, "x")], 50));
        assert!(!timestamp_match(&r, &[change("c2", 0, "x")], 50));
    }

    #[test]
    fn checksum_requires_same_entity() {
        let r = row(None);
        assert!(checksum_match(&r, "abc", &[change("c1", 10_000, "abc")]));
        assert!(!checksum_match(&r, "abc", &[change("c9", 0, "abc")]));
    }
}
