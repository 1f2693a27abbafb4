//! Local list store: the collaborator side of the sync.
//!
//! [`JsonFileStore`] reads and writes the shopping list file format used by
//! home automation hubs: a JSON array of `{"id", "name", "complete"}`
//! objects. Unknown per-item fields are preserved on rewrite.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use cartsync_core::{CompletionFlags, Item, Side, Snapshot, normalize};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// One local entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalEntry {
    /// Display text.
    pub name: String,
    /// Whether the user ticked it off.
    pub completed: bool,
}

impl LocalEntry {
    /// An open entry.
    pub fn open(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            completed: false,
        }
    }

    /// A completed entry.
    pub fn done(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            completed: true,
        }
    }
}

/// Local store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed.
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backing file is not a list of items.
    #[error("store file is malformed: {0}")]
    Format(#[from] serde_json::Error),
}

/// Contract of the local list store.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Every entry in stored order, completed ones included.
    async fn list_items(&self) -> Result<Vec<LocalEntry>, StoreError>;
    /// Append an open entry unless one with the same key exists.
    async fn add_item(&self, name: &str) -> Result<(), StoreError>;
    /// Drop every entry whose key matches `name`. Returns how many went.
    async fn remove_item(&self, name: &str) -> Result<usize, StoreError>;
}

/// Split entries into the local snapshot and its completion flags.
pub fn local_snapshot(entries: &[LocalEntry]) -> (Snapshot, CompletionFlags) {
    let items = entries.iter().map(|e| Item::new(e.name.clone())).collect();
    let flags = entries.iter().filter(|e| e.completed).map(|e| e.name.as_str()).collect();
    (Snapshot::capture(Side::Local, items), flags)
}

/// Split off entries the remote side has already settled: completed entries
/// no longer open remotely, and entries whose remote row is ticked.
///
/// Returns the entries left for reconciliation and the names to clear from
/// the store. An entry still open on the remote list is always kept.
pub fn settle_local(entries: &[LocalEntry], remote: &Snapshot, ticked: &[Item]) -> (Vec<LocalEntry>, Vec<String>) {
    let open = remote.keys();
    let ticked: HashSet<&str> = ticked.iter().map(|i| i.key.as_str()).collect();
    let mut kept = Vec::with_capacity(entries.len());
    let mut settled = Vec::new();
    for entry in entries {
        let key = normalize(&entry.name);
        if !open.contains(key.as_str()) && (entry.completed || ticked.contains(key.as_str())) {
            settled.push(entry.name.clone());
        } else {
            kept.push(entry.clone());
        }
    }
    (kept, settled)
}

// ─────────────────────────────────────────────────────────────────────────────
// JSON file store
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
struct StoredItem {
    #[serde(default)]
    id: String,
    name: String,
    #[serde(default)]
    complete: bool,
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

/// File-backed store. A missing file is an empty list.
pub struct JsonFileStore {
    path: PathBuf,
    lock: tokio::sync::Mutex<()>,
}

impl JsonFileStore {
    /// Store backed by `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Vec<StoredItem>, StoreError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) if raw.trim().is_empty() => Ok(Vec::new()),
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Write via a sibling temp file and rename, so readers never see a
    /// partial list.
    async fn save(&self, items: &[StoredItem]) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }
        let body = serde_json::to_vec_pretty(items)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), count = items.len(), "local list written");
        Ok(())
    }
}

#[async_trait]
impl LocalStore for JsonFileStore {
    async fn list_items(&self) -> Result<Vec<LocalEntry>, StoreError> {
        let _guard = self.lock.lock().await;
        Ok(self
            .load()
            .await?
            .into_iter()
            .map(|i| LocalEntry {
                name: i.name,
                completed: i.complete,
            })
            .collect())
    }

    async fn add_item(&self, name: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut items = self.load().await?;
        let key = normalize(name);
        if items.iter().any(|i| normalize(&i.name) == key) {
            return Ok(());
        }
        items.push(StoredItem {
            id: uuid::Uuid::new_v4().simple().to_string(),
            name: name.to_string(),
            complete: false,
            extra: serde_json::Map::new(),
        });
        self.save(&items).await
    }

    async fn remove_item(&self, name: &str) -> Result<usize, StoreError> {
        let _guard = self.lock.lock().await;
        let mut items = self.load().await?;
        let key = normalize(name);
        let before = items.len();
        items.retain(|i| normalize(&i.name) != key);
        let dropped = before - items.len();
        if dropped > 0 {
            self.save(&items).await?;
        }
        Ok(dropped)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// In-memory store
// ─────────────────────────────────────────────────────────────────────────────

/// Store kept in memory, for embedding and tests.
#[derive(Default)]
pub struct MemoryStore {
    entries: parking_lot::Mutex<Vec<LocalEntry>>,
}

impl MemoryStore {
    /// Store pre-filled with `entries`.
    pub fn with_entries(entries: Vec<LocalEntry>) -> Self {
        Self {
            entries: parking_lot::Mutex::new(entries),
        }
    }

    /// Current contents.
    pub fn entries(&self) -> Vec<LocalEntry> {
        self.entries.lock().clone()
    }

    /// Replace the contents, as an outside edit would.
    pub fn replace(&self, entries: Vec<LocalEntry>) {
        *self.entries.lock() = entries;
    }
}

#[async_trait]
impl LocalStore for MemoryStore {
    async fn list_items(&self) -> Result<Vec<LocalEntry>, StoreError> {
        Ok(self.entries())
    }

    async fn add_item(&self, name: &str) -> Result<(), StoreError> {
        let key = normalize(name);
        let mut entries = self.entries.lock();
        if !entries.iter().any(|e| normalize(&e.name) == key) {
            entries.push(LocalEntry::open(name));
        }
        Ok(())
    }

    async fn remove_item(&self, name: &str) -> Result<usize, StoreError> {
        let key = normalize(name);
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|e| normalize(&e.name) != key);
        Ok(before - entries.len())
    }
}
