//! Summaries returned by sync, merge, and maintenance passes.

use serde::Serialize;

use crate::optimistic::SweepReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    #[default]
    Success,
    /// Not attempted or cut short: the remote store is unreachable.
    Offline,
    /// A queued command was rejected; later commands were held back.
    PushFailed,
}

/// Result of one full sync pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub status: SyncStatus,
    /// Queued commands confirmed by the remote store.
    pub pushed: usize,
    /// Commands that failed this pass and stay queued.
    pub push_failed: usize,
    pub merge: MergeReport,
}

/// Result of absorbing one batch of remote rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub pulled: usize,
    pub applied: usize,
    pub echoes_dropped: usize,
    /// Completions dropped by the dedupe window.
    pub duplicates: usize,
    /// Operations the reducer had nothing to do for.
    pub no_ops: usize,
    pub conflicts_detected: usize,
    /// Pending conflicts closed by a resolution made on another device.
    pub conflicts_settled: usize,
    pub skipped_protected: usize,
    pub skipped_invalid: usize,
    /// Operations already in the local log or already reflected in state.
    pub already_applied: usize,
    /// A restore was in progress; nothing was absorbed.
    pub restore_blocked: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MaintenanceReport {
    pub queue_expired: usize,
    pub conflicts_dismissed: usize,
    pub conflicts_purged: usize,
    pub changes_pruned: usize,
    pub optimistic: SweepReport,
    /// Queued commands pushed because their optimistic updates timed out.
    pub resubmitted: usize,
}
