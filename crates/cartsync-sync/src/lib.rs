//! # cartsync-sync
//!
//! Coordination half of cartsync:
//!
//! - [`SyncCoordinator`]: single-flight cycles (ensure connected, snapshot,
//!   reconcile, apply, emit)
//! - [`LocalStore`]: collaborator store contract, with [`JsonFileStore`] and
//!   [`MemoryStore`]
//! - [`SyncService`]: periodic timer, manual trigger and teardown

#![deny(unsafe_code)]

pub mod coordinator;
pub mod scheduler;
pub mod store;

pub use coordinator::{Phase, SyncCoordinator, Trigger, TriggerOutcome};
pub use scheduler::{SyncService, run_timer};
pub use store::{JsonFileStore, LocalEntry, LocalStore, MemoryStore, StoreError, local_snapshot, settle_local};
