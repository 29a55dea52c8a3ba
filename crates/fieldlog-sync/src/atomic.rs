//! Atomic operation service: one local mutation, its durable queue entry,
//! its remote submission, and its optimistic entry as a single unit.
//!
//! The confirmed-state write guard is held from the snapshot until the new
//! state, the sequenced operation, and its queue entry are committed in one
//! store transaction, so no other writer observes the intermediate state. It
//! is released before the network is touched: readers see the committed
//! change while the submission is in flight. A crash after the commit leaves
//! a queued command, never a lost one. At most one command is on the wire
//! at a time, which keeps this device's sequence order at the server.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, instrument, warn};

use fieldlog_core::errors::{FieldlogError, FieldlogResult};
use fieldlog_core::models::{Operation, OperationKind, QueueStatus};
use fieldlog_core::traits::RemoteStore;
use fieldlog_core::{AppState, Clock};
use fieldlog_storage::queries::command_queue_ops;
use fieldlog_storage::StorageEngine;

use crate::echo::ChangeTracker;
use crate::oplog::OperationLog;
use crate::optimistic::{OptimisticIntent, OptimisticLayer};
use crate::queue::CommandQueue;
use crate::state::LocalState;

/// One unit of work for `AtomicOperationService::execute`.
#[derive(Debug, Clone)]
pub struct AtomicRequest {
    /// Becomes both the operation id and the optimistic update id.
    pub operation_id: String,
    /// Operation timestamp; also the time the mutator was computed for.
    pub at: DateTime<Utc>,
    pub kind: OperationKind,
    pub intent: Option<OptimisticIntent>,
    /// Restore the previous confirmed state when submission fails. When
    /// false the change stays committed and the command stays queued.
    pub rollback_on_failure: bool,
}

#[derive(Debug, Clone, Default)]
pub struct AtomicOutcome {
    pub success: bool,
    pub operation: Option<Operation>,
    pub error: Option<FieldlogError>,
    /// The operation is in the command queue awaiting submission.
    pub queued: bool,
    /// Rejected as a duplicate of an existing completion; nothing changed.
    pub deduplicated: bool,
}

impl AtomicOutcome {
    pub fn failed(error: FieldlogError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }

    pub fn noop() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    pub fn duplicate() -> Self {
        Self {
            success: true,
            deduplicated: true,
            ..Self::default()
        }
    }

    /// Whether the change is part of confirmed local state.
    pub fn committed(&self) -> bool {
        self.operation.is_some() && (self.success || self.queued)
    }
}

pub struct AtomicOperationService<R: RemoteStore> {
    storage: Arc<StorageEngine>,
    state: Arc<LocalState>,
    oplog: Arc<OperationLog>,
    tracker: Arc<ChangeTracker>,
    optimistic: Arc<OptimisticLayer>,
    remote: Arc<R>,
    online: Arc<AtomicBool>,
    clock: Arc<dyn Clock>,
    submissions: Mutex<()>,
}

impl<R: RemoteStore> AtomicOperationService<R> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        storage: Arc<StorageEngine>,
        state: Arc<LocalState>,
        oplog: Arc<OperationLog>,
        tracker: Arc<ChangeTracker>,
        optimistic: Arc<OptimisticLayer>,
        remote: Arc<R>,
        online: Arc<AtomicBool>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            storage,
            state,
            oplog,
            tracker,
            optimistic,
            remote,
            online,
            clock,
            submissions: Mutex::new(()),
        }
    }

    fn go_offline(&self, error: &FieldlogError) {
        if error.is_network() && self.online.swap(false, Ordering::SeqCst) {
            warn!(%error, "remote store unreachable, switching to offline mode");
        }
    }

    /// Run `mutator` against the confirmed state and submit the resulting
    /// operation. Validation failures from `mutator` leave everything
    /// untouched.
    #[instrument(skip_all, fields(operation_id = %request.operation_id, kind = request.kind.name()))]
    pub async fn execute<F>(&self, request: AtomicRequest, mutator: F) -> AtomicOutcome
    where
        F: FnOnce(&mut AppState) -> FieldlogResult<()>,
    {
        let AtomicRequest {
            operation_id,
            at,
            kind,
            intent,
            rollback_on_failure,
        } = request;

        let mut guard = self.state.write().await;
        let previous = guard.clone();
        let update_id = intent.map(|intent| {
            self.optimistic
                .apply_intent(intent, Some(operation_id.clone()))
        });
        let revert = |reason: &str| {
            if let Some(id) = &update_id {
                self.optimistic.revert_update(id, reason);
            }
        };

        let mut next = previous.clone();
        if let Err(error) = mutator(&mut next) {
            revert("rejected by validation");
            debug!(%error, "mutation rejected");
            return AtomicOutcome::failed(error);
        }

        let now = self.clock.now();
        let now_ms = now.timestamp_millis();
        let online = self.online.load(Ordering::SeqCst);
        // Never waits: with another command on the wire this one queues.
        let gate = if online {
            self.submissions.try_lock().ok()
        } else {
            None
        };
        let may_submit = gate.is_some();
        let committed = self
            .storage
            .with_transaction(|conn| {
                // Commands still waiting go out first; submitting past them
                // would reorder this device's sequence at the server.
                let direct = may_submit && command_queue_ops::count_by_status(conn)?.total() == 0;
                let status = if direct {
                    QueueStatus::Processing
                } else {
                    QueueStatus::Pending
                };
                LocalState::persist_in(conn, &next, now_ms)?;
                let operation = self.oplog.create_in(conn, operation_id.clone(), kind, at)?;
                let queue_id = CommandQueue::add_in(conn, &operation, status, now)?;
                if !direct {
                    OperationLog::record_local_in(conn, &operation, now)?;
                }
                Ok((operation, queue_id, direct))
            })
            .await;
        let (operation, queue_id, direct) = match committed {
            Ok(committed) => committed,
            Err(error) => {
                revert("local commit failed");
                return AtomicOutcome::failed(error);
            }
        };
        *guard = next.clone();
        drop(guard);

        if !direct {
            debug!(sequence = operation.sequence, online, "operation queued");
            return AtomicOutcome {
                success: true,
                operation: Some(operation),
                queued: true,
                ..AtomicOutcome::default()
            };
        }

        match self.remote.submit(&operation).await {
            Ok(receipt) => {
                let finished = match self.tracker.change_for(&operation, &receipt) {
                    Ok(change) => {
                        self.storage
                            .with_transaction(|conn| {
                                command_queue_ops::mark_completed(conn, &queue_id)?;
                                OperationLog::record_local_in(conn, &operation, now)?;
                                ChangeTracker::track_in(conn, &change)
                            })
                            .await
                    }
                    Err(error) => Err(error),
                };
                if let Err(error) = finished {
                    // Back in line for the next drain; the remote store
                    // ignores the repeat.
                    warn!(%error, "submitted operation could not be marked complete");
                    let requeued = self
                        .storage
                        .with_conn(|conn| command_queue_ops::reset_to_pending(conn, &queue_id))
                        .await;
                    if let Err(error) = requeued {
                        warn!(%error, "command left in processing until next drain");
                    }
                }
                if let Some(id) = &update_id {
                    self.optimistic.confirm_update(id, None);
                }
                AtomicOutcome {
                    success: true,
                    operation: Some(operation),
                    ..AtomicOutcome::default()
                }
            }
            Err(error) if rollback_on_failure => {
                self.go_offline(&error);
                let mut guard = self.state.write().await;
                if *guard != next {
                    // Later writes were built on this change; undoing it
                    // would orphan them.
                    drop(guard);
                    warn!(%error, "state moved on during submission, keeping change queued");
                    return self.keep_queued(operation, &queue_id, error, now).await;
                }
                let restored = self
                    .storage
                    .with_transaction(|conn| {
                        LocalState::persist_in(conn, &previous, now_ms)?;
                        command_queue_ops::mark_completed(conn, &queue_id)?;
                        Ok(())
                    })
                    .await;
                match restored {
                    Ok(()) => *guard = previous,
                    Err(restore_error) => {
                        drop(guard);
                        warn!(%restore_error, "rollback could not be persisted");
                        return self.keep_queued(operation, &queue_id, error, now).await;
                    }
                }
                drop(guard);
                revert(&error.to_string());
                info!(%error, "submission failed, rolled back");
                AtomicOutcome::failed(error)
            }
            Err(error) => {
                self.go_offline(&error);
                self.keep_queued(operation, &queue_id, error, now).await
            }
        }
    }

    /// Leave a committed change in the queue as `failed` after its direct
    /// submission did not go through.
    async fn keep_queued(
        &self,
        operation: Operation,
        queue_id: &str,
        error: FieldlogError,
        now: DateTime<Utc>,
    ) -> AtomicOutcome {
        let message = error.to_string();
        let buffered = self
            .storage
            .with_transaction(|conn| {
                command_queue_ops::mark_failed(conn, queue_id, &message)?;
                OperationLog::record_local_in(conn, &operation, now)
            })
            .await;
        if let Err(buffer_error) = buffered {
            warn!(%buffer_error, "could not record failed submission");
        }
        info!(%error, "submission failed, command kept for retry");
        AtomicOutcome {
            success: false,
            operation: Some(operation),
            error: Some(error),
            queued: true,
            deduplicated: false,
        }
    }

    /// Hold off direct submissions. The queue drain takes this so queued
    /// commands and direct ones never overlap on the wire.
    pub async fn lock_submissions(&self) -> MutexGuard<'_, ()> {
        self.submissions.lock().await
    }
}
