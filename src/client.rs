//! The public TRAILS client facade.
//!
//! [`TrailsClient`] is what applications hold. Its methods are synchronous
//! and never block on network I/O: `status`/`result`/`error` only touch the
//! outbound queue, and connectivity queries read an atomic flag. All
//! networking runs on one dedicated worker thread per active client,
//! hosting a current-thread tokio runtime that drives the
//! [`ConnectionManager`](crate::connection::ConnectionManager) to
//! completion.
//!
//! A client constructed from an absent or malformed configuration source is
//! a **no-op client**: every method succeeds trivially and performs no I/O.
//! This lets instrumentation calls stay in code paths that also run in
//! environments without the relay configured, at zero cost.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value as JsonValue;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::config::{ConfigSource, TrailsConfig};
use crate::connection::ConnectionManager;
use crate::error::TrailsError;
use crate::queue::{self, OutboundEvent, OutboundQueue, PendingMessage};
use crate::signer::PlaceholderSigner;
use crate::state::ConnectionState;
use crate::wire::MsgType;

/// Bound on pending outbound events per client.
const QUEUE_CAPACITY: usize = 1024;

/// How long `shutdown` waits for the worker thread before detaching.
const SHUTDOWN_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// TRAILS client — reports status, results, and errors to the relay.
///
/// Two lines to integrate:
///
/// ```ignore
/// let trails = TrailsClient::init();
/// trails.status(serde_json::json!({"phase": "processing", "progress": 0.5}));
/// ```
///
/// If `TRAILS_INFO` is absent, `init()` returns a no-op client where all
/// methods silently succeed.
pub struct TrailsClient {
    inner: Option<ClientInner>,
}

struct ClientInner {
    config: TrailsConfig,
    queue: OutboundQueue,
    /// Next sequence number source; assignment happens at enqueue time.
    seq: AtomicI64,
    connected: Arc<AtomicBool>,
    state_rx: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
    worker: Mutex<Option<Worker>>,
}

struct Worker {
    handle: std::thread::JoinHandle<()>,
    /// Signaled by the worker just before it exits; lets `shutdown` join
    /// with a bound.
    done_rx: std::sync::mpsc::Receiver<()>,
}

impl TrailsClient {
    /// Reads the envelope from the `TRAILS_INFO` environment variable.
    ///
    /// Absent or malformed content yields a no-op client; neither case is an
    /// error for the caller.
    pub fn init() -> Self {
        Self::from_source(&ConfigSource::Env)
    }

    /// Reads the envelope from an explicit configuration source.
    pub fn from_source(source: &ConfigSource) -> Self {
        match source.load() {
            Ok(Some(config)) => Self::activate(config),
            Ok(None) => {
                debug!("no TRAILS configuration present; using no-op client");
                Self { inner: None }
            }
            Err(e) => {
                warn!("TRAILS configuration unusable ({e}); using no-op client");
                Self { inner: None }
            }
        }
    }

    /// Activates immediately with an already-built envelope.
    pub fn init_with(config: TrailsConfig) -> Self {
        Self::activate(config)
    }

    fn activate(config: TrailsConfig) -> Self {
        let (queue, consumer) = queue::bounded(QUEUE_CAPACITY);
        let connected = Arc::new(AtomicBool::new(false));
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let cancel = CancellationToken::new();
        let manager = ConnectionManager::new(
            config.clone(),
            consumer,
            queue.clone(),
            Box::new(PlaceholderSigner::generate()),
            Arc::clone(&connected),
            state_tx,
            cancel.clone(),
        );

        let (done_tx, done_rx) = std::sync::mpsc::channel();
        let spawned = std::thread::Builder::new()
            .name("trails-ws".into())
            .spawn(move || {
                match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt.block_on(manager.run()),
                    Err(e) => error!("failed to start TRAILS worker runtime: {e}"),
                }
                let _ = done_tx.send(());
            });

        match spawned {
            Ok(handle) => Self {
                inner: Some(ClientInner {
                    config,
                    queue,
                    seq: AtomicI64::new(0),
                    connected,
                    state_rx,
                    cancel,
                    worker: Mutex::new(Some(Worker { handle, done_rx })),
                }),
            },
            Err(e) => {
                // Environmental, like a bad envelope: degrade instead of
                // failing the application.
                error!("failed to spawn TRAILS worker thread ({e}); using no-op client");
                Self { inner: None }
            }
        }
    }

    /// Whether this is a real client (not no-op).
    pub fn is_active(&self) -> bool {
        self.inner.is_some()
    }

    /// Whether the connection is registered and live right now.
    pub fn is_connected(&self) -> bool {
        self.inner
            .as_ref()
            .map(|i| i.connected.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    /// Current connection state; `Disconnected` on a no-op client.
    pub fn state(&self) -> ConnectionState {
        self.inner
            .as_ref()
            .map(|i| *i.state_rx.borrow())
            .unwrap_or(ConnectionState::Disconnected)
    }

    /// Sends a status update.
    ///
    /// Returns whether the event was accepted by the queue; `false` means it
    /// was dropped because the queue is at capacity. Always `true` on a
    /// no-op client.
    pub fn status(&self, payload: JsonValue) -> bool {
        self.send(MsgType::Status, payload, None)
    }

    /// Sends a business result. Informational to the relay; terminal for the
    /// application's lifecycle there.
    pub fn result(&self, payload: JsonValue) -> bool {
        self.send(MsgType::Result, payload, None)
    }

    /// Sends a structured error.
    pub fn error(&self, message: &str, detail: Option<JsonValue>) -> bool {
        self.send(
            MsgType::Error,
            serde_json::json!({"message": message, "detail": detail}),
            None,
        )
    }

    /// Derives the envelope for a subordinate process.
    ///
    /// The child gets a fresh identifier with `parent_id` set to this
    /// client's identity, and inherits endpoint, security level, and role
    /// references. Fails with [`TrailsError::NoIdentity`] on a no-op client
    /// — the one hard error this facade ever returns.
    pub fn create_child(&self, name: &str) -> Result<TrailsConfig, TrailsError> {
        let inner = self.inner.as_ref().ok_or(TrailsError::NoIdentity)?;
        Ok(inner.config.child(name))
    }

    /// Encodes an envelope for handing to a spawned child, e.g. as its
    /// `TRAILS_INFO` value.
    pub fn encode_config(config: &TrailsConfig) -> Result<String, TrailsError> {
        config.encode()
    }

    /// Graceful shutdown: queue a disconnect frame, stop the worker, join it
    /// with a bound.
    ///
    /// Blocks the caller up to the join timeout and returns even if the
    /// worker fails to stop in time (best-effort join, not guaranteed
    /// termination). Idempotent; a no-op on an inactive client.
    pub fn shutdown(&self) {
        let Some(inner) = &self.inner else {
            return;
        };
        let worker = {
            let mut guard = match inner.worker.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            guard.take()
        };
        let Some(worker) = worker else {
            return; // already shut down
        };

        // Queue the disconnect first so the stream loop can deliver it, then
        // cancel so every other suspension point wakes up.
        let _ = inner.queue.enqueue(OutboundEvent::Disconnect {
            reason: "completed".into(),
        });
        inner.cancel.cancel();

        match worker.done_rx.recv_timeout(SHUTDOWN_JOIN_TIMEOUT) {
            Ok(()) => {
                let _ = worker.handle.join();
            }
            Err(_) => {
                warn!("TRAILS worker did not stop within the join timeout; detaching");
            }
        }
    }

    fn send(&self, msg_type: MsgType, payload: JsonValue, correlation_id: Option<String>) -> bool {
        let Some(inner) = &self.inner else {
            return true; // no-op client
        };
        let seq = inner.seq.fetch_add(1, Ordering::Relaxed) + 1;
        let accepted = inner.queue.enqueue(OutboundEvent::Message(PendingMessage {
            msg_type,
            seq,
            payload,
            correlation_id,
        }));
        if !accepted {
            debug!(seq, msg_type = msg_type.as_str(), "event dropped");
        }
        accepted
    }
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        // Stops background reconnect attempts if the client is dropped
        // without an explicit shutdown; the worker exits on its own.
        self.cancel.cancel();
    }
}
