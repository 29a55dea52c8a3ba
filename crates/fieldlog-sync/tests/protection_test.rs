//! Protection flag windows, expiry, and clock skew.

use std::sync::Arc;

use chrono::Duration;
use proptest::prelude::*;

use fieldlog_core::config::ProtectionConfig;
use fieldlog_core::constants::MAX_PROTECTION_FLAG_TIMEOUT_MS;
use fieldlog_core::errors::FieldlogError;
use fieldlog_storage::queries::protection_flag_ops;
use fieldlog_storage::StorageEngine;
use fieldlog_sync::{ProtectionFlag, ProtectionFlags};
use test_fixtures::{base_time, ManualClock};

// ─── Helpers ───────────────────────────────────────────────

fn flags() -> (ProtectionFlags, Arc<StorageEngine>, Arc<ManualClock>) {
    let storage = Arc::new(StorageEngine::open_in_memory().unwrap());
    let clock = Arc::new(ManualClock::default());
    let flags = ProtectionFlags::new(
        Arc::clone(&storage),
        clock.clone(),
        ProtectionConfig::default(),
    );
    (flags, storage, clock)
}

async fn stored_flags(storage: &StorageEngine) -> usize {
    storage
        .with_conn(protection_flag_ops::list_flags)
        .await
        .unwrap()
        .len()
}

// ─── Windows ───────────────────────────────────────────────

#[tokio::test]
async fn flag_is_active_until_its_timeout() {
    let (flags, storage, clock) = flags();
    flags.set("visit", 1_000).await.unwrap();

    assert!(flags.is_active("visit").await.unwrap());
    clock.advance(Duration::milliseconds(999));
    assert!(flags.is_active("visit").await.unwrap());
    clock.advance(Duration::milliseconds(1));
    assert!(!flags.is_active("visit").await.unwrap());
    assert_eq!(stored_flags(&storage).await, 0, "expired flag is removed");
}

#[tokio::test]
async fn setting_again_refreshes_the_window() {
    let (flags, _storage, clock) = flags();
    flags.set("visit", 1_000).await.unwrap();
    clock.advance(Duration::milliseconds(800));
    flags.set("visit", 1_000).await.unwrap();
    clock.advance(Duration::milliseconds(800));

    assert!(flags.is_active("visit").await.unwrap());
}

#[tokio::test]
async fn backwards_clock_clears_the_flag() {
    let (flags, storage, clock) = flags();
    flags.set_flag(ProtectionFlag::DaySession).await.unwrap();

    clock.rewind(Duration::seconds(5));
    assert!(!flags.is_flag_active(ProtectionFlag::DaySession).await.unwrap());
    assert_eq!(stored_flags(&storage).await, 0);

    // Returning to the original time does not bring it back.
    clock.set(base_time());
    assert!(!flags.is_flag_active(ProtectionFlag::DaySession).await.unwrap());
}

#[tokio::test]
async fn timeouts_are_bounded() {
    let (flags, _storage, _clock) = flags();

    for timeout in [0, MAX_PROTECTION_FLAG_TIMEOUT_MS + 1] {
        let result = flags.set("visit", timeout).await;
        assert!(matches!(result, Err(FieldlogError::ValidationError(_))));
    }
    flags.set("visit", MAX_PROTECTION_FLAG_TIMEOUT_MS).await.unwrap();
    assert!(flags.is_active("visit").await.unwrap());
}

#[tokio::test]
async fn cleared_and_unknown_flags_are_inactive() {
    let (flags, _storage, _clock) = flags();
    assert!(!flags.is_active("never-set").await.unwrap());

    flags.set_flag(ProtectionFlag::RestoreInProgress).await.unwrap();
    flags.clear_flag(ProtectionFlag::RestoreInProgress).await.unwrap();
    assert!(!flags
        .is_flag_active(ProtectionFlag::RestoreInProgress)
        .await
        .unwrap());
}

#[tokio::test]
async fn built_in_flags_use_configured_timeouts() {
    let (flags, _storage, clock) = flags();
    flags.set_flag(ProtectionFlag::ActiveVisit).await.unwrap();
    flags.set_flag(ProtectionFlag::DaySession).await.unwrap();

    clock.advance(Duration::seconds(61));
    assert!(flags.is_flag_active(ProtectionFlag::ActiveVisit).await.unwrap());
    assert!(!flags.is_flag_active(ProtectionFlag::DaySession).await.unwrap());
}

// ─── Properties ────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn active_exactly_inside_zero_to_timeout(
        timeout_ms in 1u64..=MAX_PROTECTION_FLAG_TIMEOUT_MS,
        elapsed_ms in -600_000i64..7_200_000,
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let active = runtime.block_on(async {
            let (flags, _storage, clock) = flags();
            flags.set("visit", timeout_ms).await.unwrap();
            clock.set(base_time() + Duration::milliseconds(elapsed_ms));
            flags.is_active("visit").await.unwrap()
        });
        prop_assert_eq!(active, elapsed_ms >= 0 && (elapsed_ms as u64) < timeout_ms);
    }
}
