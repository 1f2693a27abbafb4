//! Seams between the coordinator, the list adapter and the control channel.
//!
//! The coordinator only sees [`RemoteControl`] and [`ListAccess`]; the
//! adapter only sees [`PageEvaluator`]. Tests substitute fakes at each seam.

use async_trait::async_trait;
use cartsync_core::{ConnectionState, Item};
use serde_json::Value;

use crate::error::RemoteError;

// ─────────────────────────────────────────────────────────────────────────────
// Dependency injection traits
// ─────────────────────────────────────────────────────────────────────────────

/// Script evaluation in the attached page.
#[async_trait]
pub trait PageEvaluator: Send + Sync {
    /// Evaluate `script` and return its JSON-serialized value.
    async fn evaluate(&self, script: &str) -> Result<Value, RemoteError>;
}

/// Connection lifecycle of the remote side.
#[async_trait]
pub trait RemoteControl: Send + Sync {
    /// Connect unless already connected, with bounded backoff.
    async fn ensure_connected(&self) -> Result<(), RemoteError>;
    /// Current connection state.
    fn state(&self) -> ConnectionState;
    /// Close the control channel. Best effort.
    async fn disconnect(&self);
}

/// One read of the remote list, split by checkbox state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RemoteList {
    /// Unchecked items in on-page order.
    pub open: Vec<Item>,
    /// Items already ticked off on the page.
    pub ticked: Vec<Item>,
}

/// Domain operations on the remote list.
#[async_trait]
pub trait ListAccess: Send + Sync {
    /// Open (unchecked) items in on-page order.
    async fn read_items(&self) -> Result<Vec<Item>, RemoteError>;
    /// Open and ticked items from a single read. Implementations that cannot
    /// see checkbox state report nothing ticked.
    async fn read_list(&self) -> Result<RemoteList, RemoteError> {
        Ok(RemoteList {
            open: self.read_items().await?,
            ticked: Vec::new(),
        })
    }
    /// Add `name` unless an item with the same key is already listed.
    async fn add_item(&self, name: &str) -> Result<(), RemoteError>;
    /// Delete the item matching `name`. `Ok(false)` when nothing matched.
    async fn remove_item(&self, name: &str) -> Result<bool, RemoteError>;
}
