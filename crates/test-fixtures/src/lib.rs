//! Shared test fixtures: an in-memory remote operation store, a manual
//! clock, and entity builders.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use tokio::sync::broadcast;
use tracing::debug;

use fieldlog_core::errors::{FieldlogResult, SyncError};
use fieldlog_core::models::*;
use fieldlog_core::traits::RemoteStore;
use fieldlog_core::Clock;

// ── Clock ─────────────────────────────────────────────────────────────────

/// A clock that only moves when told to. Can be moved backwards to
/// simulate skew.
#[derive(Debug)]
pub struct ManualClock {
    now_ms: AtomicI64,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now_ms: AtomicI64::new(start.timestamp_millis()),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        self.now_ms.store(at.timestamp_millis(), Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.now_ms.fetch_add(by.num_milliseconds(), Ordering::SeqCst);
    }

    pub fn rewind(&self, by: Duration) {
        self.now_ms.fetch_sub(by.num_milliseconds(), Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(base_time())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.now_ms.load(Ordering::SeqCst)).unwrap_or_default()
    }
}

/// 2025-06-02 08:00:00 UTC, a Monday.
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 2, 8, 0, 0)
        .single()
        .unwrap_or_default()
}

// ── Remote store ──────────────────────────────────────────────────────────

#[derive(Default)]
struct RemoteLog {
    rows: Vec<RemoteRow>,
    receipts: HashMap<(String, u64), SubmitReceipt>,
    last_server_ms: i64,
}

/// Append-only in-memory operation store. Server timestamps are strictly
/// increasing arrival times, independent of any device clock.
pub struct MockRemoteStore {
    log: Mutex<RemoteLog>,
    offline: AtomicBool,
    fail_submits: AtomicUsize,
    reject_submits: AtomicUsize,
    submit_calls: AtomicUsize,
    pull_calls: AtomicUsize,
    latency_ms: AtomicUsize,
    push: broadcast::Sender<RemoteRow>,
}

impl Default for MockRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRemoteStore {
    pub fn new() -> Self {
        let (push, _) = broadcast::channel(256);
        Self {
            log: Mutex::new(RemoteLog {
                last_server_ms: base_time().timestamp_millis(),
                ..RemoteLog::default()
            }),
            offline: AtomicBool::new(false),
            fail_submits: AtomicUsize::new(0),
            reject_submits: AtomicUsize::new(0),
            submit_calls: AtomicUsize::new(0),
            pull_calls: AtomicUsize::new(0),
            latency_ms: AtomicUsize::new(0),
            push,
        }
    }

    fn log(&self) -> MutexGuard<'_, RemoteLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every call fails with a network error while offline.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Fail the next `n` submits with a network error.
    pub fn fail_next_submits(&self, n: usize) {
        self.fail_submits.store(n, Ordering::SeqCst);
    }

    /// Reject the next `n` submits.
    pub fn reject_next_submits(&self, n: usize) {
        self.reject_submits.store(n, Ordering::SeqCst);
    }

    /// Delay every call, so concurrent callers overlap.
    pub fn set_latency(&self, latency: StdDuration) {
        self.latency_ms
            .store(latency.as_millis() as usize, Ordering::SeqCst);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RemoteRow> {
        self.push.subscribe()
    }

    pub fn rows(&self) -> Vec<RemoteRow> {
        self.log().rows.clone()
    }

    pub fn submit_calls(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }

    pub fn pull_calls(&self) -> usize {
        self.pull_calls.load(Ordering::SeqCst)
    }

    /// Append a hand-built row (e.g. one without `updated_by`), stamping
    /// the next server timestamp. Returns the stored row.
    pub fn inject_row(&self, mut row: RemoteRow) -> RemoteRow {
        let mut log = self.log();
        row.updated_at = next_server_time(&mut log);
        log.rows.push(row.clone());
        drop(log);
        let _ = self.push.send(row.clone());
        row
    }

    fn take_one(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn submit_now(&self, operation: &Operation) -> FieldlogResult<SubmitReceipt> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) || Self::take_one(&self.fail_submits) {
            return Err(SyncError::NetworkError {
                reason: "remote store unreachable".to_string(),
            }
            .into());
        }
        if Self::take_one(&self.reject_submits) {
            return Err(SyncError::Rejected {
                operation_id: operation.id.clone(),
                reason: "rejected by test".to_string(),
            }
            .into());
        }

        let key = (operation.client_id.clone(), operation.sequence);
        let mut log = self.log();
        if let Some(receipt) = log.receipts.get(&key) {
            return Ok(receipt.clone());
        }
        let server_timestamp = next_server_time(&mut log);
        let row = RemoteRow::from_operation(operation, server_timestamp)?;
        let receipt = SubmitReceipt {
            operation_id: operation.id.clone(),
            server_timestamp,
        };
        log.rows.push(row.clone());
        log.receipts.insert(key, receipt.clone());
        drop(log);

        debug!(operation_id = %operation.id, "mock remote stored operation");
        let _ = self.push.send(row);
        Ok(receipt)
    }

    fn pull_now(
        &self,
        watermark: Option<DateTime<Utc>>,
        limit: usize,
    ) -> FieldlogResult<Vec<RemoteRow>> {
        self.pull_calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(SyncError::NetworkError {
                reason: "remote store unreachable".to_string(),
            }
            .into());
        }
        Ok(self
            .log()
            .rows
            .iter()
            .filter(|row| watermark.map_or(true, |w| row.updated_at > w))
            .take(limit)
            .cloned()
            .collect())
    }

    fn latency(&self) -> Option<StdDuration> {
        match self.latency_ms.load(Ordering::SeqCst) {
            0 => None,
            ms => Some(StdDuration::from_millis(ms as u64)),
        }
    }
}

fn next_server_time(log: &mut RemoteLog) -> DateTime<Utc> {
    let now = Utc::now().timestamp_millis().max(log.last_server_ms + 1);
    log.last_server_ms = now;
    DateTime::from_timestamp_millis(now).unwrap_or_default()
}

impl RemoteStore for MockRemoteStore {
    fn submit(
        &self,
        operation: &Operation,
    ) -> impl Future<Output = FieldlogResult<SubmitReceipt>> + Send {
        let latency = self.latency();
        async move {
            match latency {
                Some(d) => tokio::time::sleep(d).await,
                None => tokio::task::yield_now().await,
            }
            self.submit_now(operation)
        }
    }

    fn pull_since(
        &self,
        watermark: Option<DateTime<Utc>>,
        limit: usize,
    ) -> impl Future<Output = FieldlogResult<Vec<RemoteRow>>> + Send {
        let latency = self.latency();
        async move {
            match latency {
                Some(d) => tokio::time::sleep(d).await,
                None => tokio::task::yield_now().await,
            }
            self.pull_now(watermark, limit)
        }
    }
}

// ── Builders ──────────────────────────────────────────────────────────────

pub fn addresses(n: usize) -> Vec<Address> {
    (0..n)
        .map(|i| Address::new(format!("{} Canal Street", i + 1)))
        .collect()
}

pub fn completion(id: &str, index: usize, at: DateTime<Utc>) -> Completion {
    Completion {
        id: id.to_string(),
        index,
        address: format!("{} Canal Street", index + 1),
        outcome: Outcome::Done,
        amount: None,
        timestamp: at,
        list_version: 1,
        time_spent_secs: None,
        version: 1,
    }
}

pub fn arrangement(id: &str, at: DateTime<Utc>) -> Arrangement {
    Arrangement {
        id: id.to_string(),
        address_index: 0,
        address: "1 Canal Street".to_string(),
        customer_name: Some("A. Customer".to_string()),
        amount: 150.0,
        scheduled_date: at.date_naive() + Duration::days(7),
        status: ArrangementStatus::Scheduled,
        notes: None,
        created_at: at,
        updated_at: at,
        version: 1,
    }
}

pub fn session(date: NaiveDate, start: DateTime<Utc>) -> DaySession {
    DaySession {
        date,
        start,
        end: None,
        duration_secs: None,
    }
}

pub fn state_with_addresses(n: usize) -> AppState {
    AppState {
        addresses: addresses(n),
        ..AppState::default()
    }
}
