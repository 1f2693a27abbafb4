//! Remote connection lifecycle state.

use std::fmt;

use serde::{Deserialize, Serialize};

/// State of the control channel to the browser.
///
/// Owned by the remote client; everything else only reads it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionState {
    /// No channel open.
    #[default]
    Disconnected,
    /// Discovery or attach in progress.
    Connecting,
    /// Attached and usable.
    Connected,
    /// Reconnect attempts exhausted; retried on the next cycle.
    Degraded {
        /// Last failure seen.
        reason: String,
    },
}

impl ConnectionState {
    /// Whether the channel is attached.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("disconnected"),
            Self::Connecting => f.write_str("connecting"),
            Self::Connected => f.write_str("connected"),
            Self::Degraded { reason } => write!(f, "degraded ({reason})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_disconnected() {
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
    }

    #[test]
    fn only_connected_is_connected() {
        assert!(ConnectionState::Connected.is_connected());
        assert!(!ConnectionState::Connecting.is_connected());
        assert!(
            !ConnectionState::Degraded {
                reason: "x".into()
            }
            .is_connected()
        );
    }

    #[test]
    fn degraded_display_includes_reason() {
        let s = ConnectionState::Degraded {
            reason: "endpoint unreachable".into(),
        };
        assert_eq!(s.to_string(), "degraded (endpoint unreachable)");
    }

    #[test]
    fn serde_tagged_shape() {
        let json = serde_json::to_value(ConnectionState::Degraded {
            reason: "gone".into(),
        })
        .unwrap();
        assert_eq!(json["state"], "degraded");
        assert_eq!(json["reason"], "gone");
    }
}
