//! Recomputes the UI view: confirmed state plus live optimistic deltas.

use fieldlog_core::models::{AppState, StateUpdate, UpdateOperation, UpdateType};

/// Layer `updates` over a copy of `base`, oldest first. Reverted updates are
/// skipped. `base` is never modified.
pub fn merge(base: &AppState, mut updates: Vec<StateUpdate>) -> AppState {
    let mut view = base.clone();
    updates.retain(|u| u.update_type != UpdateType::Reverted);
    updates.sort_by_key(|u| u.timestamp);
    for update in updates {
        match update.operation {
            UpdateOperation::Create | UpdateOperation::Update => view.upsert(update.data),
            UpdateOperation::Delete => {
                view.remove(&update.data);
            }
        }
    }
    view
}
