//! Outcome of one sync cycle, as emitted to observers.
//!
//! Wire format (the first six fields are stable):
//! ```json
//! {
//!   "success": true,
//!   "changed": true,
//!   "added": ["Eggs"],
//!   "removed": ["Milk"],
//!   "alexa_count": 3,
//!   "ha_count": 3,
//!   "connected": true,
//!   "timestamp": "2026-01-01T00:00:00Z"
//! }
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Classified reason a cycle (or part of it) failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Discovery endpoint could not be reached.
    EndpointUnreachable,
    /// No open target matched the list URL pattern.
    TargetNotFound,
    /// A page evaluation did not answer in time.
    EvaluationTimeout,
    /// The page reported a script fault.
    Evaluation,
    /// Expected page elements were absent.
    PageStructure,
    /// The page shows a login or verification wall.
    AuthenticationRequired,
    /// The control channel dropped mid-cycle.
    ConnectionLost,
    /// Reading or writing the local store failed.
    LocalStore,
    /// Teardown interrupted the cycle.
    Cancelled,
}

impl FailureKind {
    /// Whether a human has to intervene before syncs can succeed again.
    pub fn needs_human(self) -> bool {
        matches!(self, Self::AuthenticationRequired)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::EndpointUnreachable => "endpoint_unreachable",
            Self::TargetNotFound => "target_not_found",
            Self::EvaluationTimeout => "evaluation_timeout",
            Self::Evaluation => "evaluation",
            Self::PageStructure => "page_structure",
            Self::AuthenticationRequired => "authentication_required",
            Self::ConnectionLost => "connection_lost",
            Self::LocalStore => "local_store",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Error attached to a failed [`SyncResult`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncFailure {
    /// Classification.
    pub kind: FailureKind,
    /// Human-readable detail.
    pub message: String,
}

impl SyncFailure {
    /// Build a failure.
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Immutable outcome of one cycle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    /// Whether every step and mutation succeeded.
    pub success: bool,
    /// Whether the cycle planned any operation.
    pub changed: bool,
    /// Display names actually created on either side.
    pub added: Vec<String>,
    /// Display names actually removed from the remote list.
    pub removed: Vec<String>,
    /// Remote item count after the cycle.
    #[serde(rename = "alexa_count")]
    pub remote_count: usize,
    /// Local item count after the cycle.
    #[serde(rename = "ha_count")]
    pub local_count: usize,
    /// Whether the control channel was attached at the end of the cycle.
    pub connected: bool,
    /// When the cycle finished.
    pub timestamp: DateTime<Utc>,
    /// Failure detail, absent on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<SyncFailure>,
}

impl SyncResult {
    /// A failed cycle that changed nothing.
    pub fn failed(failure: SyncFailure, remote_count: usize, local_count: usize, connected: bool) -> Self {
        Self {
            success: false,
            changed: false,
            added: Vec::new(),
            removed: Vec::new(),
            remote_count,
            local_count,
            connected,
            timestamp: Utc::now(),
            error: Some(failure),
        }
    }

    /// Failure kind, if any.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}
