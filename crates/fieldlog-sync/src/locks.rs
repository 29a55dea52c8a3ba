//! Coalescing lock registry behind the merge mutex and the sync lock.
//!
//! `acquire_and_run(key, f)`: the first caller for a key runs `f`; every
//! caller arriving while it runs waits for and receives that same result.
//! The slot is cleared when the leader finishes, but only if the slot still
//! holds the leader's own task, so a newer task is never evicted by a stale
//! completion. Release happens in `Drop`, so it also runs when the leader's
//! future is cancelled.

use std::future::Future;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::watch;
use tracing::debug;

use fieldlog_core::errors::{FieldlogResult, SyncError};

type Outcome<T> = Option<FieldlogResult<T>>;

struct InFlight<T> {
    result: watch::Receiver<Outcome<T>>,
}

/// A registry of in-flight tasks keyed by lock name. One instance per
/// owner; never a global.
pub struct LockRegistry<T> {
    slots: DashMap<String, Arc<InFlight<T>>>,
}

impl<T> Default for LockRegistry<T> {
    fn default() -> Self {
        Self {
            slots: DashMap::new(),
        }
    }
}

struct SlotGuard<'a, T> {
    slots: &'a DashMap<String, Arc<InFlight<T>>>,
    key: String,
    task: Arc<InFlight<T>>,
}

impl<T> Drop for SlotGuard<'_, T> {
    fn drop(&mut self) {
        self.slots
            .remove_if(&self.key, |_, current| Arc::ptr_eq(current, &self.task));
    }
}

enum Role<T> {
    Leader(watch::Sender<Outcome<T>>, Arc<InFlight<T>>),
    Follower(watch::Receiver<Outcome<T>>),
}

impl<T: Clone> LockRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a task is currently running under `key`.
    pub fn is_held(&self, key: &str) -> bool {
        self.slots.contains_key(key)
    }

    pub async fn acquire_and_run<F, Fut>(&self, key: &str, f: F) -> FieldlogResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FieldlogResult<T>>,
    {
        let role = match self.slots.entry(key.to_string()) {
            Entry::Occupied(entry) => Role::Follower(entry.get().result.clone()),
            Entry::Vacant(entry) => {
                let (tx, rx) = watch::channel(None);
                let task = Arc::new(InFlight { result: rx });
                entry.insert(Arc::clone(&task));
                Role::Leader(tx, task)
            }
        };

        match role {
            Role::Follower(mut rx) => {
                debug!(key, "joining in-flight task");
                let outcome = rx
                    .wait_for(Option::is_some)
                    .await
                    .map_err(|_| SyncError::LockAbandoned {
                        key: key.to_string(),
                    })?;
                match &*outcome {
                    Some(result) => result.clone(),
                    None => Err(SyncError::LockAbandoned {
                        key: key.to_string(),
                    }
                    .into()),
                }
            }
            Role::Leader(tx, task) => {
                let _guard = SlotGuard {
                    slots: &self.slots,
                    key: key.to_string(),
                    task,
                };
                let result = f().await;
                tx.send_replace(Some(result.clone()));
                result
            }
        }
    }
}
