//! # trails-client: TRAILS lifecycle/signaling client with automatic reconnection
//!
//! The client-side runtime for the TRAILS protocol: a process reports
//! status, results, and errors to a remote relay over a persistent WebSocket
//! connection, while the relay tracks liveness. This crate supplies:
//!
//! - **A synchronous, never-blocking API** — `status`/`result`/`error` only
//!   enqueue; all network I/O runs on a dedicated background worker
//! - **Automatic reconnection** with exponential backoff and jitter
//! - **Registration / re-registration** carrying a sequence cursor, so the
//!   relay can detect gaps across reconnects
//! - **At-least-once delivery** of queued events under transient failure
//! - **Zero-cost no-op mode** when no configuration is present
//! - **Child envelope derivation** for spawning subordinate processes
//!
//! # Quick Start
//!
//! ```ignore
//! use trails_client::TrailsClient;
//!
//! fn main() {
//!     // Reads TRAILS_INFO; a no-op client if it is absent.
//!     let trails = TrailsClient::init();
//!
//!     trails.status(serde_json::json!({"phase": "processing", "progress": 0.5}));
//!
//!     // ... do the work ...
//!
//!     trails.result(serde_json::json!({"rows": 12_345}));
//!     trails.shutdown();
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │   Application threads                │
//! │   TrailsClient (sync facade)         │
//! └────────────┬─────────────────────────┘
//!              │ OutboundQueue (bounded, drop-newest)
//! ┌────────────▼─────────────────────────┐
//! │   Worker thread ("trails-ws")        │
//! │   ConnectionManager                  │
//! │   connect → register → stream loop   │
//! │   Backoff, ConnectionState broadcast │
//! └────────────┬─────────────────────────┘
//!              │
//! ┌────────────▼─────────────────────────┐
//! │   tokio-tungstenite WebSocket        │
//! │   TRAILS relay                       │
//! └──────────────────────────────────────┘
//! ```
//!
//! The queue is the only structure shared between the application and the
//! worker, and its bound is the only admission control: when it is full the
//! newest event is dropped and the call reports failure, keeping the
//! application thread live at the price of telemetry completeness.
//!
//! # Connection Lifecycle
//!
//! ```text
//! Disconnected ──> Connecting ──> Registering ──> Connected
//!      ▲               │               │              │
//!      │          (error)        (rejected/        (stream
//!      │                          timeout)          error)
//!      └──────── backoff ◄───────────┴──────────────┘
//! ```
//!
//! The first connection registers with full identity and process metadata;
//! every reconnect re-registers with the last transmitted sequence number.
//! On shutdown a best-effort `disconnect` frame distinguishes intentional
//! termination from a crash.
//!
//! # Error Handling
//!
//! Network conditions never reach the caller: transport and registration
//! failures are absorbed by the reconnect loop, and a missing or malformed
//! configuration degrades to a no-op client. The observable signals are
//! `is_connected()` / `state()` and the boolean enqueue outcome of
//! `status`/`result`/`error`. The single hard error is
//! [`TrailsError::NoIdentity`], returned by `create_child` on a no-op
//! client.

pub mod backoff;
pub mod client;
pub mod config;
pub mod connection;
pub mod endpoint;
pub mod error;
pub mod identity;
pub mod queue;
pub mod signer;
pub mod state;
pub mod wire;

// Re-exports: the common entry points.
pub use client::TrailsClient;
pub use config::{ConfigSource, Originator, TrailsConfig, TRAILS_INFO_VAR};
// Re-exports: error handling.
pub use error::TrailsError;
// Re-exports: connection monitoring.
pub use state::ConnectionState;
// Re-exports: the signing extension point.
pub use signer::{FrameSigner, PlaceholderSigner};

/// Result type for TRAILS client operations.
pub type Result<T> = std::result::Result<T, TrailsError>;
