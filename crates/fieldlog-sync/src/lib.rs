//! # fieldlog-sync
//!
//! Client-side synchronization engine: operation log, durable command
//! queue, protection flags, coalescing locks, the atomic operation service,
//! conflict detection and resolution, the optimistic update layer, and the
//! echo filter. `SyncEngine` ties them together.

pub mod atomic;
pub mod conflict;
pub mod echo;
pub mod engine;
pub mod locks;
pub mod oplog;
pub mod optimistic;
pub mod protection;
pub mod queue;
pub mod state;
pub mod tracing_setup;

pub use atomic::{AtomicOperationService, AtomicOutcome, AtomicRequest};
pub use conflict::ConflictManager;
pub use echo::{EchoFilter, EchoVerdict};
pub use engine::{MaintenanceReport, MergeReport, SyncEngine, SyncReport, SyncStatus};
pub use locks::LockRegistry;
pub use optimistic::OptimisticLayer;
pub use protection::{ProtectionFlag, ProtectionFlags};
pub use queue::CommandQueue;
