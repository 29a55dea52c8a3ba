//! # fieldlog-core
//!
//! Foundation crate for the fieldlog offline-first sync client.
//! Defines the operation log vocabulary, entities, the operation reducer,
//! errors, config, and constants. Every other crate in the workspace
//! depends on this.

pub mod checksum;
pub mod clock;
pub mod config;
pub mod constants;
pub mod errors;
pub mod models;
pub mod reducer;
pub mod traits;
pub mod validation;

pub use clock::{Clock, SystemClock};
pub use config::FieldlogConfig;
pub use errors::{FieldlogError, FieldlogResult};
pub use models::{AppState, Operation, OperationKind};
