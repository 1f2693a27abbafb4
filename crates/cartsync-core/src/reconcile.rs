//! Diffing of the remote and local snapshots.
//!
//! The policy is asymmetric. The remote list is the authority for deletions:
//! an item removed locally without being completed reappears on the next
//! cycle. Completion is the only local signal that removes anything remotely.
//!
//! No local removals are ever planned here. Clearing a completed local entry
//! happens in the coordinator once the matching remote removal succeeded.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::snapshot::{CompletionFlags, Snapshot};

/// Operations needed to converge both sides.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcilePlan {
    /// Display names to create in the local store (remote casing).
    pub local_adds: Vec<String>,
    /// Display names to create on the remote page (local casing).
    pub remote_adds: Vec<String>,
    /// Display names to remove from the remote page (remote casing).
    pub remote_removes: Vec<String>,
}

impl ReconcilePlan {
    /// Whether the plan contains no operations.
    pub fn is_empty(&self) -> bool {
        self.local_adds.is_empty() && self.remote_adds.is_empty() && self.remote_removes.is_empty()
    }

    /// Total number of planned operations.
    pub fn len(&self) -> usize {
        self.local_adds.len() + self.remote_adds.len() + self.remote_removes.len()
    }
}

/// Compute the plan converging `remote` and `local`.
///
/// Pure and deterministic: output order follows snapshot order, and a key
/// that occurs several times on one side is planned once (first occurrence
/// wins). Entries present on both sides are never rewritten, even when their
/// casing differs.
pub fn reconcile(remote: &Snapshot, local: &Snapshot, completed: &CompletionFlags) -> ReconcilePlan {
    let remote_keys = remote.keys();
    let local_keys = local.keys();
    let mut plan = ReconcilePlan::default();

    let mut seen = HashSet::new();
    for item in remote.items() {
        if !seen.insert(item.key.as_str()) {
            continue;
        }
        if !local_keys.contains(item.key.as_str()) {
            plan.local_adds.push(item.display.clone());
        } else if completed.is_completed(&item.key) {
            plan.remote_removes.push(item.display.clone());
        }
    }

    let mut seen = HashSet::new();
    for item in local.items() {
        if !seen.insert(item.key.as_str()) {
            continue;
        }
        if !remote_keys.contains(item.key.as_str()) && !completed.is_completed(&item.key) {
            plan.remote_adds.push(item.display.clone());
        }
    }

    plan
}
