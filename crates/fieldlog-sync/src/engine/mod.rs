//! SyncEngine: owns every component of the client and is the single entry
//! point for the UI. Local edits go through `submit_operation`; inbound
//! changes arrive through `sync`, `merge_remote`, and the push channel.

mod reports;
mod resolve;
mod sync_pass;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration as StdDuration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use fieldlog_core::errors::{FieldlogError, FieldlogResult};
use fieldlog_core::models::{AppState, OperationKind, VersionConflict};
use fieldlog_core::reducer::{self, Applied, ReducerSettings};
use fieldlog_core::traits::RemoteStore;
use fieldlog_core::{Clock, FieldlogConfig};
use fieldlog_storage::StorageEngine;

use crate::atomic::{AtomicOperationService, AtomicOutcome, AtomicRequest};
use crate::conflict::ConflictManager;
use crate::echo::{ChangeTracker, EchoFilter};
use crate::locks::LockRegistry;
use crate::oplog::OperationLog;
use crate::optimistic::{intent_for, OptimisticLayer};
use crate::protection::{ProtectionFlag, ProtectionFlags};
use crate::queue::CommandQueue;
use crate::state::{LoadReport, LocalState};

pub use reports::{MaintenanceReport, MergeReport, SyncReport, SyncStatus};

const MERGE_KEY: &str = "merge-remote";
const SYNC_KEY: &str = "sync-pass";

pub struct SyncEngine<R: RemoteStore> {
    storage: Arc<StorageEngine>,
    remote: Arc<R>,
    clock: Arc<dyn Clock>,
    config: FieldlogConfig,
    settings: ReducerSettings,
    online: Arc<AtomicBool>,
    oplog: Arc<OperationLog>,
    state: Arc<LocalState>,
    optimistic: Arc<OptimisticLayer>,
    tracker: Arc<ChangeTracker>,
    queue: CommandQueue,
    flags: ProtectionFlags,
    echo: EchoFilter,
    atomic: AtomicOperationService<R>,
    conflicts: ConflictManager,
    merge_mutex: LockRegistry<MergeReport>,
    sync_lock: LockRegistry<SyncReport>,
    /// Serializes conflict resolutions against each other.
    resolution_lock: Mutex<()>,
    load_report: LoadReport,
}

impl<R: RemoteStore> SyncEngine<R> {
    /// Load device identity and confirmed state, and return commands an
    /// interrupted drain left in `processing` to the queue.
    pub async fn open(
        storage: Arc<StorageEngine>,
        remote: Arc<R>,
        clock: Arc<dyn Clock>,
        config: FieldlogConfig,
    ) -> FieldlogResult<Self> {
        config.validate()?;
        let oplog = Arc::new(OperationLog::open(Arc::clone(&storage)).await?);
        let (state, load_report) = LocalState::load(Arc::clone(&storage), Arc::clone(&clock)).await?;
        let state = Arc::new(state);

        let queue = CommandQueue::new(
            Arc::clone(&storage),
            Arc::clone(&clock),
            config.queue.clone(),
        );
        queue.recover_stale_processing().await?;

        let online = Arc::new(AtomicBool::new(config.sync.start_online));
        let optimistic = Arc::new(OptimisticLayer::new(
            Arc::clone(&clock),
            config.optimistic.clone(),
        ));
        let tracker = Arc::new(ChangeTracker::new(
            Arc::clone(&storage),
            Arc::clone(&clock),
            config.echo.change_retention_ms,
        ));
        let echo = EchoFilter::new(
            Arc::clone(&tracker),
            oplog.client_id().to_string(),
            config.echo.clone(),
        );
        let flags = ProtectionFlags::new(
            Arc::clone(&storage),
            Arc::clone(&clock),
            config.protection.clone(),
        );
        let atomic = AtomicOperationService::new(
            Arc::clone(&storage),
            Arc::clone(&state),
            Arc::clone(&oplog),
            Arc::clone(&tracker),
            Arc::clone(&optimistic),
            Arc::clone(&remote),
            Arc::clone(&online),
            Arc::clone(&clock),
        );
        let conflicts = ConflictManager::new(
            Arc::clone(&storage),
            Arc::clone(&clock),
            config.conflicts.clone(),
        );

        info!(client_id = oplog.client_id(), "sync engine opened");
        Ok(Self {
            settings: ReducerSettings {
                completion_dedupe_window_ms: config.sync.completion_dedupe_window_ms,
            },
            storage,
            remote,
            clock,
            config,
            online,
            oplog,
            state,
            optimistic,
            tracker,
            queue,
            flags,
            echo,
            atomic,
            conflicts,
            merge_mutex: LockRegistry::new(),
            sync_lock: LockRegistry::new(),
            resolution_lock: Mutex::new(()),
            load_report,
        })
    }

    // ── Local edits ───────────────────────────────────────────────────────

    /// The only path from the UI to the remote store.
    ///
    /// Update operations are stamped with the local entity's current
    /// version. Duplicate completions and operations that change nothing
    /// return without producing an operation.
    pub async fn submit_operation(&self, mut kind: OperationKind) -> AtomicOutcome {
        if matches!(kind, OperationKind::ConflictResolve { .. }) {
            return AtomicOutcome::failed(FieldlogError::ValidationError(
                "conflict resolutions are produced by the resolver".to_string(),
            ));
        }

        let at = self.clock.now();
        let before = self.state.snapshot().await;
        stamp_expected_version(&mut kind, &before);

        let mut after = before.clone();
        match reducer::apply(&mut after, &kind, at, &self.settings) {
            Ok(Applied::Applied) => {}
            Ok(Applied::Duplicate) => {
                info!(kind = kind.name(), "duplicate completion ignored");
                return AtomicOutcome::duplicate();
            }
            Ok(Applied::NoOp(reason)) => {
                debug!(kind = kind.name(), reason, "operation changes nothing");
                return AtomicOutcome::noop();
            }
            Err(error) => return AtomicOutcome::failed(error),
        }

        let request = AtomicRequest {
            operation_id: Uuid::new_v4().to_string(),
            at,
            intent: intent_for(&kind, &before, &after),
            kind: kind.clone(),
            rollback_on_failure: false,
        };
        let settings = self.settings;
        let outcome = self
            .atomic
            .execute(request, |state| {
                match reducer::apply(state, &kind, at, &settings)? {
                    Applied::Applied => Ok(()),
                    Applied::Duplicate => Err(FieldlogError::ValidationError(
                        "duplicate completion".to_string(),
                    )),
                    Applied::NoOp(reason) => Err(FieldlogError::ValidationError(reason.to_string())),
                }
            })
            .await;

        if outcome.committed() {
            self.protect_local_edit(&kind).await;
        }
        outcome
    }

    /// Shield a local cursor or session edit from being overwritten by an
    /// inbound operation for a short window.
    async fn protect_local_edit(&self, kind: &OperationKind) {
        let flag = match kind {
            OperationKind::ActiveIndexSet { .. } => ProtectionFlag::ActiveVisit,
            OperationKind::SessionStart { .. } | OperationKind::SessionEnd { .. } => {
                ProtectionFlag::DaySession
            }
            _ => return,
        };
        if let Err(error) = self.flags.set_flag(flag).await {
            warn!(%error, flag = flag.key(), "could not set protection flag");
        }
    }

    // ── Connectivity ──────────────────────────────────────────────────────

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    pub fn set_online(&self, online: bool) {
        if self.online.swap(online, Ordering::SeqCst) != online {
            info!(online, "connectivity changed");
        }
    }

    fn go_offline(&self, error: &FieldlogError) {
        if error.is_network() && self.online.swap(false, Ordering::SeqCst) {
            warn!(%error, "remote store unreachable, switching to offline mode");
        }
    }

    // ── Restore guard ─────────────────────────────────────────────────────

    /// Block inbound merges while a restore rewrites local state.
    pub async fn begin_restore(&self) -> FieldlogResult<()> {
        self.flags.set_flag(ProtectionFlag::RestoreInProgress).await
    }

    pub async fn end_restore(&self) -> FieldlogResult<()> {
        self.flags.clear_flag(ProtectionFlag::RestoreInProgress).await
    }

    // ── Maintenance ───────────────────────────────────────────────────────

    /// Expire old queue entries, close stale conflicts, prune tracked
    /// changes, and time out optimistic updates. Updates that timed out
    /// with retries left get their queued commands pushed again.
    pub async fn run_maintenance(&self) -> FieldlogResult<MaintenanceReport> {
        let mut report = MaintenanceReport {
            queue_expired: self.queue.cleanup_old().await?,
            conflicts_dismissed: self.conflicts.auto_dismiss().await?,
            conflicts_purged: self.conflicts.cleanup().await?,
            changes_pruned: self.tracker.prune().await?,
            optimistic: self.optimistic.sweep(),
            resubmitted: 0,
        };
        if report.optimistic.retried > 0 && self.is_online() {
            let (pushed, _) = self.drain_queue().await?;
            report.resubmitted = pushed;
        }
        debug!(?report, "maintenance pass");
        Ok(report)
    }

    /// Run maintenance every `interval` until the engine is dropped.
    pub fn spawn_maintenance(self: &Arc<Self>, interval: StdDuration) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(engine) = weak.upgrade() else {
                    break;
                };
                if let Err(error) = engine.run_maintenance().await {
                    warn!(%error, "maintenance pass failed");
                }
            }
        })
    }

    // ── Views ─────────────────────────────────────────────────────────────

    pub fn client_id(&self) -> &str {
        self.oplog.client_id()
    }

    /// Confirmed state only.
    pub async fn confirmed_state(&self) -> AppState {
        self.state.snapshot().await
    }

    /// Confirmed state with pending optimistic updates layered on top.
    pub async fn merged_state(&self) -> AppState {
        let base = self.state.read().await;
        self.optimistic.merged_view(&base)
    }

    pub async fn pending_conflicts(&self) -> FieldlogResult<Vec<VersionConflict>> {
        self.conflicts.pending().await
    }

    pub async fn resolved_conflicts(&self) -> FieldlogResult<Vec<VersionConflict>> {
        self.conflicts.resolved().await
    }

    pub fn load_report(&self) -> &LoadReport {
        &self.load_report
    }

    pub fn config(&self) -> &FieldlogConfig {
        &self.config
    }

    pub fn queue(&self) -> &CommandQueue {
        &self.queue
    }

    pub fn flags(&self) -> &ProtectionFlags {
        &self.flags
    }

    pub fn optimistic(&self) -> &OptimisticLayer {
        &self.optimistic
    }

    pub fn oplog(&self) -> &OperationLog {
        &self.oplog
    }

    pub fn storage(&self) -> &StorageEngine {
        &self.storage
    }
}

/// Point update operations at the version they were written against.
fn stamp_expected_version(kind: &mut OperationKind, state: &AppState) {
    match kind {
        OperationKind::CompletionUpdate {
            id,
            expected_version,
            ..
        } => {
            if let Some(local) = state.completion(id) {
                *expected_version = local.version;
            }
        }
        OperationKind::ArrangementUpdate {
            id,
            expected_version,
            ..
        } => {
            if let Some(local) = state.arrangement(id) {
                *expected_version = local.version;
            }
        }
        _ => {}
    }
}
