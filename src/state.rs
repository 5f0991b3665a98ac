//! Connection state tracking for the TRAILS client.
//!
//! The connection manager maintains a [`ConnectionState`] and broadcasts it
//! over a `tokio::sync::watch` channel, so application code can observe the
//! lifecycle without polling the socket. `Connected` is the only state in
//! which `TrailsClient::is_connected` reports true.

use std::fmt;

/// The lifecycle state of the client's single logical connection.
///
/// Transitions are driven exclusively by the background connection manager:
///
/// ```text
/// Disconnected ──> Connecting ──> Registering ──> Connected
///      ▲               │               │              │
///      │         (connect error) (rejected/timeout) (stream error)
///      └───────────────┴───────────────┴──────────────┘
/// ```
///
/// Any state moves to `ShuttingDown` once shutdown is requested; no further
/// reconnection attempts occur after that.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No transport connection. Either the initial state, or the aftermath of
    /// a transport error, timeout, or rejected registration. The manager will
    /// retry after a backoff delay.
    Disconnected,

    /// A connection attempt is in flight.
    Connecting,

    /// The transport is open and a `register`/`re_register` frame has been
    /// sent; awaiting the relay's acknowledgment.
    Registering,

    /// Registration acknowledged; the per-connection message loop is running.
    /// This is the only state suitable for delivery.
    Connected,

    /// Shutdown was requested. Terminal: the manager halts instead of
    /// reconnecting.
    ShuttingDown,
}

impl ConnectionState {
    /// Short static identifier, for logs and diagnostics.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Registering => "Registering",
            ConnectionState::Connected => "Connected",
            ConnectionState::ShuttingDown => "ShuttingDown",
        }
    }

    /// True only in `Connected`.
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    /// True while the manager is working toward a connection
    /// (`Connecting` or `Registering`).
    pub fn is_connecting(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Registering
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_as_str() {
        assert_eq!(ConnectionState::Disconnected.as_str(), "Disconnected");
        assert_eq!(ConnectionState::Connecting.as_str(), "Connecting");
        assert_eq!(ConnectionState::Registering.as_str(), "Registering");
        assert_eq!(ConnectionState::Connected.as_str(), "Connected");
        assert_eq!(ConnectionState::ShuttingDown.as_str(), "ShuttingDown");
    }

    #[test]
    fn test_is_connected_only_when_connected() {
        assert!(ConnectionState::Connected.is_connected());
        assert!(!ConnectionState::Disconnected.is_connected());
        assert!(!ConnectionState::Connecting.is_connected());
        assert!(!ConnectionState::Registering.is_connected());
        assert!(!ConnectionState::ShuttingDown.is_connected());
    }

    #[test]
    fn test_is_connecting() {
        assert!(ConnectionState::Connecting.is_connecting());
        assert!(ConnectionState::Registering.is_connecting());
        assert!(!ConnectionState::Connected.is_connecting());
        assert!(!ConnectionState::Disconnected.is_connecting());
    }

    #[test]
    fn test_display() {
        assert_eq!(ConnectionState::Registering.to_string(), "Registering");
    }
}
