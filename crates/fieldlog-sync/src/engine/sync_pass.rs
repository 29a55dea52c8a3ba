//! Outbound drain, inbound merge, and the push-channel consumer.

use std::collections::HashSet;

use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, instrument, warn};

use fieldlog_core::errors::FieldlogResult;
use fieldlog_core::models::{Operation, OperationKind, RemoteRow, VersionConflict};
use fieldlog_core::reducer::{self, Applied};
use fieldlog_core::traits::RemoteStore;
use fieldlog_storage::queries::command_queue_ops;

use super::{MergeReport, SyncEngine, SyncReport, SyncStatus, MERGE_KEY, SYNC_KEY};
use crate::conflict::{detect, settled_by, ConflictManager, Detection, Settled};
use crate::echo::ChangeTracker;
use crate::oplog::OperationLog;
use crate::protection::ProtectionFlag;
use crate::state::LocalState;

/// Which protection flags were active when a merge began.
#[derive(Debug, Clone, Copy)]
struct Shielded {
    active_visit: bool,
    day_session: bool,
}

impl Shielded {
    fn covers(&self, kind: &OperationKind) -> bool {
        match kind {
            OperationKind::ActiveIndexSet { .. } => self.active_visit,
            OperationKind::SessionStart { .. } | OperationKind::SessionEnd { .. } => {
                self.day_session
            }
            _ => false,
        }
    }
}

pub(super) enum Drained {
    Clean,
    Offline,
    Failed,
}

impl<R: RemoteStore> SyncEngine<R> {
    /// One full pass: push queued commands, absorb remote changes, then run
    /// maintenance. Concurrent callers share one pass.
    pub async fn sync(&self) -> FieldlogResult<SyncReport> {
        self.sync_lock
            .acquire_and_run(SYNC_KEY, || self.sync_pass())
            .await
    }

    #[instrument(skip(self))]
    async fn sync_pass(&self) -> FieldlogResult<SyncReport> {
        let mut report = SyncReport::default();
        if !self.is_online() {
            report.status = SyncStatus::Offline;
            return Ok(report);
        }

        let (pushed, drained) = self.drain_queue().await?;
        report.pushed = pushed;
        match drained {
            Drained::Clean => {}
            Drained::Failed => {
                report.push_failed = 1;
                report.status = SyncStatus::PushFailed;
            }
            Drained::Offline => {
                report.push_failed = 1;
                report.status = SyncStatus::Offline;
                return Ok(report);
            }
        }

        report.merge = match self.merge_remote().await {
            Ok(merge) => merge,
            Err(error) if error.is_network() => {
                report.status = SyncStatus::Offline;
                return Ok(report);
            }
            Err(error) => return Err(error),
        };
        self.run_maintenance().await?;
        info!(
            pushed = report.pushed,
            pulled = report.merge.pulled,
            applied = report.merge.applied,
            conflicts = report.merge.conflicts_detected,
            "sync pass complete"
        );
        Ok(report)
    }

    /// Submit queued commands oldest first. Stops at the first failure so
    /// this device's operations reach the server in sequence order.
    pub(super) async fn drain_queue(&self) -> FieldlogResult<(usize, Drained)> {
        // With the gate held nothing else is on the wire, so anything still
        // `processing` was stranded by an earlier pass.
        let _gate = self.atomic.lock_submissions().await;
        self.queue.recover_stale_processing().await?;
        self.queue.retry_failed().await?;
        let mut pushed = 0;
        loop {
            let batch = self
                .queue
                .get_next_pending(self.config.queue.batch_size)
                .await?;
            if batch.is_empty() {
                return Ok((pushed, Drained::Clean));
            }
            for item in batch {
                if !self.queue.mark_processing(&item.id).await? {
                    continue;
                }
                match self.remote.submit(&item.operation).await {
                    Ok(receipt) => {
                        let change = self.tracker.change_for(&item.operation, &receipt)?;
                        let now = self.clock.now();
                        self.storage
                            .with_transaction(|conn| {
                                command_queue_ops::mark_completed(conn, &item.id)?;
                                OperationLog::record_local_in(conn, &item.operation, now)?;
                                ChangeTracker::track_in(conn, &change)
                            })
                            .await?;
                        self.optimistic.confirm_update(&item.operation.id, None);
                        pushed += 1;
                    }
                    Err(error) => {
                        self.queue.mark_failed(&item.id, &error.to_string()).await?;
                        if error.is_network() {
                            self.go_offline(&error);
                            return Ok((pushed, Drained::Offline));
                        }
                        return Ok((pushed, Drained::Failed));
                    }
                }
            }
        }
    }

    /// Absorb remote rows newer than the watermark. Concurrent callers
    /// share one pass.
    pub async fn merge_remote(&self) -> FieldlogResult<MergeReport> {
        self.merge_mutex
            .acquire_and_run(MERGE_KEY, || self.merge_pass())
            .await
    }

    async fn pull_all(&self) -> FieldlogResult<Vec<RemoteRow>> {
        let page_size = self.config.sync.pull_page_size;
        let mut watermark = self.oplog.watermark().await?;
        let mut rows = Vec::new();
        loop {
            let page = match self.remote.pull_since(watermark, page_size).await {
                Ok(page) => page,
                Err(error) => {
                    self.go_offline(&error);
                    return Err(error);
                }
            };
            let full = page.len() >= page_size;
            if let Some(last) = page.iter().map(|row| row.updated_at).max() {
                watermark = Some(last);
            }
            rows.extend(page);
            if !full {
                return Ok(rows);
            }
        }
    }

    #[instrument(skip(self))]
    async fn merge_pass(&self) -> FieldlogResult<MergeReport> {
        let mut report = MergeReport::default();
        if self
            .flags
            .is_flag_active(ProtectionFlag::RestoreInProgress)
            .await?
        {
            info!("restore in progress, merge deferred");
            report.restore_blocked = true;
            return Ok(report);
        }
        let shielded = Shielded {
            active_visit: self.flags.is_flag_active(ProtectionFlag::ActiveVisit).await?,
            day_session: self.flags.is_flag_active(ProtectionFlag::DaySession).await?,
        };

        let rows = self.pull_all().await?;
        if rows.is_empty() {
            return Ok(report);
        }
        report.pulled = rows.len();
        let watermark = rows.iter().map(|row| row.updated_at).max();

        let mut guard = self.state.write().await;
        let mut next = guard.clone();
        let mut absorbed: Vec<Operation> = Vec::new();
        let mut conflicts: Vec<VersionConflict> = Vec::new();
        let mut settled: Vec<Settled> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let now = self.clock.now();

        for row in &rows {
            if self.echo.classify(row).await?.is_echo() {
                report.echoes_dropped += 1;
                continue;
            }
            let operation = match row.operation() {
                Ok(operation) => operation,
                Err(error) => {
                    warn!(entity = %row.entity, id = %row.id, %error, "unreadable remote row");
                    report.skipped_invalid += 1;
                    continue;
                }
            };
            let known = self
                .storage
                .with_conn(|conn| OperationLog::contains_in(conn, &operation.id))
                .await?;
            if known || !seen.insert(operation.id.clone()) {
                report.already_applied += 1;
                continue;
            }
            if shielded.covers(&operation.kind) {
                debug!(kind = operation.kind.name(), "protected, inbound operation skipped");
                report.skipped_protected += 1;
                absorbed.push(operation);
                continue;
            }

            match detect(&operation, &next, now)? {
                Detection::Apply => {
                    match reducer::apply(&mut next, &operation.kind, operation.timestamp, &self.settings) {
                        Ok(Applied::Applied) => {
                            report.applied += 1;
                            settled.extend(settled_by(&operation.kind));
                        }
                        Ok(Applied::Duplicate) => report.duplicates += 1,
                        Ok(Applied::NoOp(reason)) => {
                            debug!(kind = operation.kind.name(), reason, "remote operation changed nothing");
                            report.no_ops += 1;
                            // A resolution this state already reflects still
                            // closes what it superseded here.
                            settled.extend(settled_by(&operation.kind));
                        }
                        Err(error) => {
                            warn!(operation_id = %operation.id, %error, "remote operation rejected by reducer");
                            report.skipped_invalid += 1;
                        }
                    }
                }
                Detection::AlreadyApplied => report.already_applied += 1,
                Detection::Conflict(conflict) => {
                    report.conflicts_detected += 1;
                    conflicts.push(*conflict);
                }
            }
            absorbed.push(operation);
        }

        let now_ms = now.timestamp_millis();
        report.conflicts_settled = self
            .storage
            .with_transaction(|conn| {
                LocalState::persist_in(conn, &next, now_ms)?;
                for operation in &absorbed {
                    OperationLog::record_remote_in(conn, operation, now)?;
                }
                for conflict in &conflicts {
                    ConflictManager::record_in(conn, conflict)?;
                }
                // After recording: conflicts raised earlier in this batch
                // can already be superseded.
                let mut closed = 0;
                for entity in &settled {
                    closed += ConflictManager::settle_in(conn, entity, now_ms)?;
                }
                if let Some(watermark) = watermark {
                    OperationLog::set_watermark_in(conn, watermark)?;
                }
                Ok(closed)
            })
            .await?;
        *guard = next;
        drop(guard);

        debug!(?report, "merge pass complete");
        Ok(report)
    }

    /// Handle one row from the push channel. Echoes stop here; anything
    /// else triggers a merge, which coalesces with one already running.
    pub async fn handle_push(&self, row: &RemoteRow) -> FieldlogResult<Option<MergeReport>> {
        if self.echo.classify(row).await?.is_echo() {
            return Ok(None);
        }
        self.merge_remote().await.map(Some)
    }

    /// Consume the push channel until it closes. A lagged receiver has
    /// missed rows, so it falls back to a full merge.
    pub async fn run_subscription(&self, mut rx: broadcast::Receiver<RemoteRow>) {
        loop {
            let result = match rx.recv().await {
                Ok(row) => self.handle_push(&row).await.map(|_| ()),
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "push channel lagged, merging");
                    self.merge_remote().await.map(|_| ())
                }
                Err(RecvError::Closed) => break,
            };
            if let Err(error) = result {
                warn!(%error, "push handling failed");
            }
        }
        debug!("push channel closed");
    }
}
