//! Unified error handling for the TRAILS client.
//!
//! `TrailsError` aggregates the failure modes of the client into a single
//! type. Most variants never reach application code: configuration problems
//! degrade the client to a no-op at construction, and transport/registration
//! failures are recovered internally by the reconnect loop. The one variant
//! an application can actually observe is [`TrailsError::NoIdentity`],
//! returned by `create_child` on a client that has no configuration — a
//! usage mistake, not an environmental condition.

use thiserror::Error;

/// The unified error type for TRAILS client operations.
#[derive(Debug, Error)]
pub enum TrailsError {
    /// The configuration envelope could not be decoded.
    ///
    /// Covers base64 and JSON failures while reading `TRAILS_INFO` (or an
    /// injected equivalent). The facade maps this to a no-op client; it is
    /// never raised to the caller.
    #[error("configuration envelope error: {0}")]
    Envelope(String),

    /// The decoded envelope failed field validation.
    ///
    /// Treated exactly like a malformed envelope: the client degrades to a
    /// no-op rather than surfacing the error.
    #[error("configuration validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    /// WebSocket-level failure: connect refused, TLS error, send on a closed
    /// connection, unexpected close.
    ///
    /// Always recovered locally by the reconnect loop with backoff.
    ///
    /// Boxed to keep the enum small; the underlying tungstenite error is
    /// large.
    #[error("transport error: {0}")]
    Transport(Box<tokio_tungstenite::tungstenite::Error>),

    /// The relay rejected a `register`/`re_register` frame, or replied with
    /// something unusable.
    ///
    /// Treated identically to a transport error: the manager disconnects and
    /// retries on the shared backoff sequence.
    #[error("registration failed: {0}")]
    Registration(String),

    /// A bounded wait elapsed (connect, registration acknowledgment).
    #[error("timed out while {0}")]
    Timeout(&'static str),

    /// JSON encoding/decoding of a wire frame failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An identity-dependent operation was invoked on a no-op client.
    ///
    /// Returned by `create_child` when the client was constructed without a
    /// configuration — there is no identity to derive from.
    #[error("no identity: this client was constructed without a configuration")]
    NoIdentity,
}

/// Boxes the tungstenite error to avoid bloating every `Result` in the crate.
impl From<tokio_tungstenite::tungstenite::Error> for TrailsError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        TrailsError::Transport(Box::new(err))
    }
}
