//! Remote-side error types.

use cartsync_core::FailureKind;
use thiserror::Error;

/// How far an error reaches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorTier {
    /// The control channel is unusable; abort the cycle, reconnect next time.
    Connection,
    /// Only the current page operation failed.
    Page,
    /// A human has to sign in again; terminal for the cycle.
    Authentication,
}

/// Errors from the remote control client and the list adapter.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// HTTP discovery failed or timed out.
    #[error("debugging endpoint {endpoint} unreachable: {reason}")]
    EndpointUnreachable {
        /// Endpoint base URL.
        endpoint: String,
        /// Underlying cause.
        reason: String,
    },

    /// No open target matched the pattern.
    #[error("no open target matches '{pattern}'")]
    TargetNotFound {
        /// URL fragment searched for.
        pattern: String,
    },

    /// A command got no answer in time.
    #[error("timed out after {timeout_ms}ms: {context}")]
    EvaluationTimeout {
        /// How long we waited.
        timeout_ms: u64,
        /// What we were waiting for.
        context: String,
    },

    /// The page context reported a script-level fault.
    #[error("script evaluation failed: {0}")]
    Evaluation(String),

    /// Expected page elements are absent.
    #[error("unexpected page structure: {0}")]
    PageStructure(String),

    /// A login or verification wall is shown.
    #[error("authentication required at {url}")]
    AuthenticationRequired {
        /// Page URL showing the wall.
        url: String,
    },

    /// The control channel closed or the protocol broke down.
    #[error("control channel error: {0}")]
    Protocol(String),
}

impl RemoteError {
    /// Propagation tier of this error.
    pub fn tier(&self) -> ErrorTier {
        match self {
            Self::EndpointUnreachable { .. } | Self::TargetNotFound { .. } | Self::Protocol(_) => {
                ErrorTier::Connection
            }
            Self::EvaluationTimeout { .. } | Self::Evaluation(_) | Self::PageStructure(_) => ErrorTier::Page,
            Self::AuthenticationRequired { .. } => ErrorTier::Authentication,
        }
    }

    /// Classification carried into a sync result.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::EndpointUnreachable { .. } => FailureKind::EndpointUnreachable,
            Self::TargetNotFound { .. } => FailureKind::TargetNotFound,
            Self::EvaluationTimeout { .. } => FailureKind::EvaluationTimeout,
            Self::Evaluation(_) => FailureKind::Evaluation,
            Self::PageStructure(_) => FailureKind::PageStructure,
            Self::AuthenticationRequired { .. } => FailureKind::AuthenticationRequired,
            Self::Protocol(_) => FailureKind::ConnectionLost,
        }
    }
}
