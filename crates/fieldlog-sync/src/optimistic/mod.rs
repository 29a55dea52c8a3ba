//! Optimistic update layer: UI-visible deltas over confirmed state.
//!
//! Entries live in memory only. The confirmed `AppState` is never touched;
//! `merged_view` recomputes base + deltas on every call.
//!
//! The layer only decides what the UI shows. A retry re-arms an entry's
//! visibility window; resubmitting the command behind it is the queue
//! drain's job, which the engine starts when a sweep reports retries. A
//! revert hides the delta while the committed change stays in confirmed
//! state and the queue.

pub mod intent;
pub mod merged;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use fieldlog_core::config::OptimisticConfig;
use fieldlog_core::models::{AppState, EntityData, StateUpdate, UpdateOperation, UpdateType};
use fieldlog_core::Clock;

pub use intent::{intent_for, OptimisticIntent};

/// One tracked update plus its bookkeeping.
#[derive(Debug, Clone)]
pub struct PendingUpdate {
    pub update: StateUpdate,
    /// Entity as it was before the update; `None` for creates.
    pub previous: Option<EntityData>,
    pub attempts: u32,
    pub deadline: DateTime<Utc>,
    /// When the entry reached `Confirmed` or `Reverted`.
    pub settled_at: Option<DateTime<Utc>>,
    pub failure: Option<String>,
}

/// Result of `fail_update`.
#[derive(Debug, Clone, PartialEq)]
pub enum FailOutcome {
    /// Re-applied; still optimistic.
    Retrying { attempt: u32 },
    /// Terminal. Carries the snapshot to roll back to.
    Reverted { previous: Option<EntityData> },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub timed_out: usize,
    /// Timed-out updates given another window; their commands need a push.
    pub retried: usize,
    /// Timed-out updates out of retries.
    pub reverted: usize,
    pub purged: usize,
}

pub struct OptimisticLayer {
    updates: DashMap<String, PendingUpdate>,
    clock: Arc<dyn Clock>,
    config: OptimisticConfig,
}

impl OptimisticLayer {
    pub fn new(clock: Arc<dyn Clock>, config: OptimisticConfig) -> Self {
        Self {
            updates: DashMap::new(),
            clock,
            config,
        }
    }

    fn deadline_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + Duration::milliseconds(self.config.timeout_ms as i64)
    }

    /// Track a new optimistic update. `update_id` ties the entry to an
    /// operation id; a fresh id is generated when absent.
    pub fn apply_update(
        &self,
        operation: UpdateOperation,
        previous: Option<EntityData>,
        data: EntityData,
        update_id: Option<String>,
    ) -> String {
        let id = update_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let now = self.clock.now();
        let update = StateUpdate {
            id: id.clone(),
            timestamp: now,
            update_type: UpdateType::Optimistic,
            operation,
            entity: data.kind(),
            entity_id: data.entity_id(),
            data,
        };
        self.updates.insert(
            id.clone(),
            PendingUpdate {
                update,
                previous,
                attempts: 0,
                deadline: self.deadline_from(now),
                settled_at: None,
                failure: None,
            },
        );
        debug!(update_id = %id, ?operation, "optimistic update applied");
        id
    }

    pub fn apply_intent(&self, intent: OptimisticIntent, update_id: Option<String>) -> String {
        self.apply_update(intent.operation, intent.previous, intent.data, update_id)
    }

    /// Mark an update confirmed, optionally replacing its data with the
    /// server's version. Unknown or already reverted updates are ignored;
    /// returns whether anything changed.
    pub fn confirm_update(&self, id: &str, final_data: Option<EntityData>) -> bool {
        let Some(mut entry) = self.updates.get_mut(id) else {
            debug!(update_id = id, "confirmation for unknown update ignored");
            return false;
        };
        if entry.update.update_type == UpdateType::Reverted {
            debug!(update_id = id, "confirmation after revert ignored");
            return false;
        }
        entry.update.update_type = UpdateType::Confirmed;
        if let Some(data) = final_data {
            entry.update.data = data;
        }
        entry.settled_at = Some(self.clock.now());
        true
    }

    /// Record a failure. With auto-retry on and attempts left the update
    /// stays visible for another timeout window; otherwise it is reverted.
    pub fn fail_update(&self, id: &str, reason: &str) -> Option<FailOutcome> {
        let mut entry = self.updates.get_mut(id)?;
        if entry.update.update_type != UpdateType::Optimistic {
            return None;
        }
        let now = self.clock.now();
        entry.failure = Some(reason.to_string());
        if self.config.auto_retry && entry.attempts < self.config.max_retries {
            entry.attempts += 1;
            entry.deadline = self.deadline_from(now);
            debug!(update_id = id, attempt = entry.attempts, reason, "retrying optimistic update");
            return Some(FailOutcome::Retrying {
                attempt: entry.attempts,
            });
        }
        entry.update.update_type = UpdateType::Reverted;
        entry.settled_at = Some(now);
        warn!(update_id = id, reason, "optimistic update reverted");
        Some(FailOutcome::Reverted {
            previous: entry.previous.clone(),
        })
    }

    /// Revert immediately, without retry.
    pub fn revert_update(&self, id: &str, reason: &str) -> Option<Option<EntityData>> {
        let mut entry = self.updates.get_mut(id)?;
        if entry.update.update_type == UpdateType::Reverted {
            return Some(entry.previous.clone());
        }
        entry.update.update_type = UpdateType::Reverted;
        entry.settled_at = Some(self.clock.now());
        entry.failure = Some(reason.to_string());
        debug!(update_id = id, reason, "optimistic update reverted");
        Some(entry.previous.clone())
    }

    /// Expire timed-out updates and remove settled ones past their grace
    /// window.
    pub fn sweep(&self) -> SweepReport {
        let now = self.clock.now();
        let mut report = SweepReport::default();

        let timed_out: Vec<String> = self
            .updates
            .iter()
            .filter(|e| e.update.update_type == UpdateType::Optimistic && e.deadline <= now)
            .map(|e| e.key().clone())
            .collect();
        for id in timed_out {
            report.timed_out += 1;
            match self.fail_update(&id, "timed out") {
                Some(FailOutcome::Retrying { .. }) => report.retried += 1,
                Some(FailOutcome::Reverted { .. }) => report.reverted += 1,
                None => {}
            }
        }

        let confirmed_grace = Duration::milliseconds(self.config.confirmed_grace_ms as i64);
        let reverted_grace = Duration::milliseconds(self.config.reverted_grace_ms as i64);
        let before = self.updates.len();
        self.updates.retain(|_, entry| {
            let grace = match entry.update.update_type {
                UpdateType::Optimistic => return true,
                UpdateType::Confirmed => confirmed_grace,
                UpdateType::Reverted => reverted_grace,
            };
            entry.settled_at.map_or(true, |at| now - at < grace)
        });
        report.purged = before - self.updates.len();
        report
    }

    pub fn get(&self, id: &str) -> Option<PendingUpdate> {
        self.updates.get(id).map(|e| e.clone())
    }

    /// Updates still awaiting confirmation, oldest first.
    pub fn pending(&self) -> Vec<StateUpdate> {
        let mut pending: Vec<StateUpdate> = self
            .updates
            .iter()
            .filter(|e| e.update.update_type == UpdateType::Optimistic)
            .map(|e| e.update.clone())
            .collect();
        pending.sort_by_key(|u| u.timestamp);
        pending
    }

    pub fn len(&self) -> usize {
        self.updates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    /// Confirmed state with every live (non-reverted) update layered on top.
    pub fn merged_view(&self, base: &AppState) -> AppState {
        let updates: Vec<StateUpdate> = self.updates.iter().map(|e| e.update.clone()).collect();
        merged::merge(base, updates)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use test_fixtures::{completion, ManualClock};

    use super::*;

    fn layer(auto_retry: bool) -> (Arc<ManualClock>, OptimisticLayer) {
        let clock = Arc::new(ManualClock::default());
        let config = OptimisticConfig {
            auto_retry,
            ..OptimisticConfig::default()
        };
        (clock.clone(), OptimisticLayer::new(clock, config))
    }

    fn data(id: &str) -> EntityData {
        EntityData::Completion(completion(id, 0, test_fixtures::base_time()))
    }

    #[test]
    fn confirm_then_purge_after_grace() {
        let (clock, layer) = layer(true);
        let id = layer.apply_update(UpdateOperation::Create, None, data("c1"), None);
        assert!(layer.confirm_update(&id, None));

        clock.advance(Duration::milliseconds(4_999));
        assert_eq!(layer.sweep().purged, 0);
        clock.advance(Duration::milliseconds(1));
        assert_eq!(layer.sweep().purged, 1);
        assert!(layer.is_empty());
    }

    #[test]
    fn confirmation_after_revert_is_noop() {
        let (_clock, layer) = layer(false);
        let id = layer.apply_update(UpdateOperation::Create, None, data("c1"), Some("op-1".into()));
        assert_eq!(id, "op-1");
        assert_eq!(layer.revert_update(&id, "rejected"), Some(None));
        assert!(!layer.confirm_update(&id, None));
        assert_eq!(layer.get(&id).unwrap().update.update_type, UpdateType::Reverted);
        assert!(!layer.confirm_update("unknown", None));
    }

    #[test]
    fn failures_retry_until_budget_then_revert() {
        let (_clock, layer) = layer(true);
        let previous = data("c1");
        let id = layer.apply_update(
            UpdateOperation::Update,
            Some(previous.clone()),
            data("c1"),
            None,
        );
        for attempt in 1..=3 {
            assert_eq!(
                layer.fail_update(&id, "network"),
                Some(FailOutcome::Retrying { attempt })
            );
        }
        assert_eq!(
            layer.fail_update(&id, "network"),
            Some(FailOutcome::Reverted {
                previous: Some(previous)
            })
        );
    }

    #[test]
    fn timeout_counts_as_failure() {
        let (clock, layer) = layer(false);
        let id = layer.apply_update(UpdateOperation::Create, None, data("c1"), None);
        clock.advance(Duration::seconds(31));
        let report = layer.sweep();
        assert_eq!(report.timed_out, 1);
        assert_eq!(report.retried, 0);
        assert_eq!(report.reverted, 1);
        assert_eq!(layer.get(&id).unwrap().update.update_type, UpdateType::Reverted);

        clock.advance(Duration::seconds(1));
        assert_eq!(layer.sweep().purged, 1);
    }

    #[test]
    fn timed_out_update_stays_visible_while_retries_remain() {
        let (clock, layer) = layer(true);
        let id = layer.apply_update(UpdateOperation::Create, None, data("c1"), None);
        clock.advance(Duration::seconds(31));

        let report = layer.sweep();
        assert_eq!(report.timed_out, 1);
        assert_eq!(report.retried, 1);
        assert_eq!(report.reverted, 0);
        let entry = layer.get(&id).unwrap();
        assert_eq!(entry.update.update_type, UpdateType::Optimistic);
        assert_eq!(entry.attempts, 1);
        assert!(entry.deadline > clock.now());
        assert!(layer.merged_view(&AppState::default()).completion("c1").is_some());
    }

    #[test]
    fn merged_view_hides_reverted_and_leaves_base_untouched() {
        let (_clock, layer) = layer(false);
        let base = AppState::default();
        let kept = layer.apply_update(UpdateOperation::Create, None, data("c1"), None);
        let dropped = layer.apply_update(UpdateOperation::Create, None, data("c2"), None);
        layer.revert_update(&dropped, "failed");

        let view = layer.merged_view(&base);
        assert!(view.completion("c1").is_some());
        assert!(view.completion("c2").is_none());
        assert!(base.completions.is_empty());
        assert_eq!(layer.pending().len(), 1);
        assert_eq!(layer.pending()[0].id, kept);
    }
}
