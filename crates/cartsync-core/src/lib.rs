//! # cartsync-core
//!
//! Shared vocabulary for keeping a browser-rendered shopping list and a local
//! list store in step:
//!
//! - **Items**: display text plus a normalized identity key
//! - **Snapshots**: immutable per-side captures with completion flags
//! - **Reconciliation**: the asymmetric diff producing a [`ReconcilePlan`]
//! - **Results**: [`SyncResult`] emitted once per cycle, [`FailureKind`]
//! - **Connection state** and reconnect backoff math

#![deny(unsafe_code)]

pub mod connection;
pub mod item;
pub mod logging;
pub mod reconcile;
pub mod result;
pub mod retry;
pub mod snapshot;

pub use connection::ConnectionState;
pub use item::{Item, normalize};
pub use reconcile::{ReconcilePlan, reconcile};
pub use result::{FailureKind, SyncFailure, SyncResult};
pub use retry::BackoffPolicy;
pub use snapshot::{CompletionFlags, Side, Snapshot};
