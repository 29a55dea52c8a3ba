//! Shared vocabulary for every component: entities, the operation union,
//! queue items, optimistic updates, conflicts, and remote rows.

pub mod app_state;
pub mod conflict;
pub mod entities;
pub mod operation;
pub mod patch;
pub mod queue_item;
pub mod remote;
pub mod state_update;
pub mod tracked_change;

pub use app_state::AppState;
pub use conflict::{ConflictEntityType, ConflictResolution, ConflictStatus, VersionConflict};
pub use entities::{
    Address, Arrangement, ArrangementStatus, Completion, DaySession, EntityData, EntityKind,
    Outcome,
};
pub use operation::{EntityTarget, Operation, OperationKind};
pub use patch::{ArrangementPatch, CompletionPatch};
pub use queue_item::{CommandQueueItem, QueueStats, QueueStatus};
pub use remote::{RemoteRow, SubmitReceipt};
pub use state_update::{StateUpdate, UpdateOperation, UpdateType};
pub use tracked_change::TrackedChange;
