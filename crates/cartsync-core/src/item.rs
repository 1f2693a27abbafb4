//! List items and their normalized identity key.
//!
//! Items carry no stable identifier on either side. Two items are the same
//! entry iff their [`normalize`]d text matches.

use serde::{Deserialize, Serialize};

/// Canonical identity form of an item's display text.
///
/// Trims, collapses every run of internal whitespace to a single space and
/// case-folds. Idempotent: `normalize(&normalize(s)) == normalize(s)`.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for (i, word) in text.split_whitespace().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.extend(word.chars().flat_map(char::to_lowercase));
    }
    out
}

/// A single list entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Text as shown on its side, casing and spacing preserved.
    pub display: String,
    /// Derived identity key.
    pub key: String,
}

impl Item {
    /// Build an item from its display text.
    pub fn new(display: impl Into<String>) -> Self {
        let display = display.into();
        let key = normalize(&display);
        Self { display, key }
    }

    /// Whether this item's key matches `other` after normalization.
    pub fn matches(&self, other: &str) -> bool {
        self.key == normalize(other)
    }
}
