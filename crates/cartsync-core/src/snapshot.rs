//! Point-in-time captures of one side's list.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::item::{Item, normalize};

/// Which side of the sync a snapshot was captured from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// The browser-rendered list.
    Remote,
    /// The collaborator store's list.
    Local,
}

/// Immutable, ordered capture of one side's items.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Snapshot {
    side: Side,
    captured_at: DateTime<Utc>,
    items: Vec<Item>,
}

impl Snapshot {
    /// Capture a snapshot now.
    pub fn capture(side: Side, items: Vec<Item>) -> Self {
        Self {
            side,
            captured_at: Utc::now(),
            items,
        }
    }

    /// Side this snapshot came from.
    pub fn side(&self) -> Side {
        self.side
    }

    /// Capture timestamp.
    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// Items in their on-side order.
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the snapshot holds no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Set of normalized keys present.
    pub fn keys(&self) -> HashSet<&str> {
        self.items.iter().map(|i| i.key.as_str()).collect()
    }

    /// Whether an item with the same normalized key is present.
    pub fn contains(&self, display: &str) -> bool {
        let key = normalize(display);
        self.items.iter().any(|i| i.key == key)
    }
}

/// Normalized keys of local items the user has marked complete.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompletionFlags {
    keys: HashSet<String>,
}

impl CompletionFlags {
    /// Empty flag set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a display name as completed.
    pub fn mark(&mut self, display: &str) {
        let _ = self.keys.insert(normalize(display));
    }

    /// Whether the given normalized key is completed.
    pub fn is_completed(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    /// Number of completed keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether no key is completed.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl<S: AsRef<str>> FromIterator<S> for CompletionFlags {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut flags = Self::new();
        for s in iter {
            flags.mark(s.as_ref());
        }
        flags
    }
}
