//! Connection management with registration, reconnection, and backoff.
//!
//! The [`ConnectionManager`] is the heart of the client. It owns the one
//! logical WebSocket connection, drives the
//! `connect → register → stream → disconnect` machine, and recovers from
//! every transport or protocol failure by backing off and reconnecting. It
//! never surfaces those failures to the application: the only externally
//! visible effects are the connection state broadcast and the connected
//! flag.
//!
//! # Architecture
//!
//! ```text
//! Application threads
//!     ↓ (OutboundQueue)
//! ConnectionManager (this module — single background task)
//!     ↓
//! tokio-tungstenite WebSocket
//!     ↓
//! Network → TRAILS relay
//! ```
//!
//! # Concurrency
//!
//! The manager runs on a single task: connect, the registration wait, and
//! the message loop never overlap. Its suspension points — connect, the
//! registration-ack wait, the per-send ack wait, the idle poll, the backoff
//! sleep — all carry explicit timeouts or observe the cancellation token,
//! so the loop cannot stall indefinitely regardless of relay behavior.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backoff::Backoff;
use crate::config::TrailsConfig;
use crate::endpoint::normalize_ws_url;
use crate::error::TrailsError;
use crate::identity;
use crate::queue::{OutboundEvent, OutboundQueue, PendingMessage, QueueConsumer};
use crate::signer::FrameSigner;
use crate::state::ConnectionState;
use crate::wire::{
    ClientFrame, DisconnectFrame, MessageFrame, MsgHeader, ReRegisterFrame, RegisterFrame,
    ServerFrame,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Bound on opening the transport connection.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Bound on the relay's answer to `register`/`re_register`.
const REGISTER_ACK_TIMEOUT: Duration = Duration::from_secs(10);

/// Bound on the post-send ack read. A timeout here is not an error — the
/// relay may batch acknowledgments.
const SEND_ACK_TIMEOUT: Duration = Duration::from_secs(1);

/// Queue poll window; also the idle read window for unsolicited frames.
const IDLE_POLL: Duration = Duration::from_millis(100);

/// Why the per-connection message loop ended.
enum StreamExit {
    /// Intentional termination: a disconnect event was delivered (or was
    /// pending when the cancellation token fired). Do not reconnect.
    Shutdown,
    /// The transport failed or the relay closed on us. Reconnect.
    ConnectionLost,
}

/// Owns the transport lifecycle for one client instance.
///
/// At most one transport connection exists at any time. The sequence cursor
/// (`last_seq`) is owned exclusively here and updated only by the background
/// loop, never by application threads.
pub struct ConnectionManager {
    config: TrailsConfig,
    consumer: QueueConsumer,
    /// Producer half of the same queue, for best-effort re-enqueue of an
    /// event whose send failed mid-stream.
    requeue: OutboundQueue,
    signer: Box<dyn FrameSigner>,
    connected: Arc<AtomicBool>,
    state_tx: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
    backoff: Backoff,
    /// Highest sequence number handed to the transport; carried in
    /// `re_register` so the relay can detect gaps.
    last_seq: i64,
    first_connect: bool,
}

impl ConnectionManager {
    pub fn new(
        config: TrailsConfig,
        consumer: QueueConsumer,
        requeue: OutboundQueue,
        signer: Box<dyn FrameSigner>,
        connected: Arc<AtomicBool>,
        state_tx: watch::Sender<ConnectionState>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            consumer,
            requeue,
            signer,
            connected,
            state_tx,
            cancel,
            backoff: Backoff::default(),
            last_seq: 0,
            first_connect: true,
        }
    }

    /// Runs the connect/register/stream machine until shutdown.
    ///
    /// Every failure class — connect refusal, TLS error, registration
    /// rejection or timeout, mid-stream close — lands on the same backoff
    /// sequence; the counter resets only on a successful registration.
    pub async fn run(mut self) {
        let url = normalize_ws_url(&self.config.server_ep);
        info!(url = %url, app_id = %self.config.app_id, "connection manager starting");

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            self.set_state(ConnectionState::Connecting);
            let ws = match self.connect(&url).await {
                Ok(ws) => ws,
                Err(e) => {
                    debug!("connect failed: {e}");
                    self.fail_and_backoff().await;
                    continue;
                }
            };

            self.set_state(ConnectionState::Registering);
            let mut ws = match self.register(ws).await {
                Ok(ws) => ws,
                Err(e) => {
                    debug!("registration failed: {e}");
                    self.fail_and_backoff().await;
                    continue;
                }
            };

            self.backoff.reset();
            self.first_connect = false;
            self.connected.store(true, Ordering::Release);
            self.set_state(ConnectionState::Connected);

            let exit = self.stream(&mut ws).await;
            self.connected.store(false, Ordering::Release);
            match exit {
                StreamExit::Shutdown => {
                    let _ = ws.close(None).await;
                    break;
                }
                StreamExit::ConnectionLost => {
                    // Release the dead transport before sleeping so only one
                    // connection ever exists per client.
                    drop(ws);
                    self.fail_and_backoff().await;
                }
            }
        }

        self.connected.store(false, Ordering::Release);
        self.set_state(ConnectionState::ShuttingDown);
        info!("connection manager stopped");
    }

    /// Opens the transport, bounded by [`CONNECT_TIMEOUT`].
    async fn connect(&self, url: &str) -> Result<WsStream, TrailsError> {
        let (ws, _response) = tokio::time::timeout(CONNECT_TIMEOUT, connect_async(url))
            .await
            .map_err(|_| TrailsError::Timeout("connecting to the relay"))??;
        info!(url = %url, "transport connected");
        Ok(ws)
    }

    /// Performs the registration handshake on a fresh connection.
    ///
    /// The first connection of the client's lifetime sends `register` with
    /// full identity and process metadata; every later connection sends
    /// `re_register` carrying the sequence cursor so the relay can resume.
    /// Exactly one acknowledgment is awaited (transport ping/pong frames are
    /// skipped); an error reply, an unreadable reply, or a timeout fails the
    /// handshake.
    async fn register(&mut self, mut ws: WsStream) -> Result<WsStream, TrailsError> {
        let frame = if self.first_connect {
            ClientFrame::Register(RegisterFrame {
                app_id: self.config.app_id,
                parent_id: self.config.parent_id,
                app_name: self.config.app_name.clone(),
                child_pub_key: self.signer.public_key(),
                process_info: identity::collect(),
                role_refs: self.config.role_refs.clone(),
                sig: None,
            })
        } else {
            ClientFrame::ReRegister(ReRegisterFrame {
                app_id: self.config.app_id,
                last_seq: self.last_seq,
                pub_key: self.signer.public_key(),
                sig: None,
            })
        };
        let json = self.encode_signed(frame)?;
        ws.send(WsMessage::Text(json)).await?;

        let deadline = tokio::time::Instant::now() + REGISTER_ACK_TIMEOUT;
        loop {
            let reply = tokio::time::timeout_at(deadline, ws.next())
                .await
                .map_err(|_| TrailsError::Timeout("awaiting registration acknowledgment"))?;
            return match reply {
                Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_))) => continue,
                Some(Ok(WsMessage::Text(text))) => {
                    match serde_json::from_str::<ServerFrame>(&text) {
                        Ok(ServerFrame::Registered(ack)) => {
                            debug!(server_pub_key = %ack.server_pub_key, "registration acknowledged");
                            Ok(ws)
                        }
                        Ok(ServerFrame::Error(err)) => Err(TrailsError::Registration(format!(
                            "{}: {}",
                            err.code, err.message
                        ))),
                        Ok(ServerFrame::Ack(_)) => {
                            // An eager relay may flush a data ack first.
                            debug!("data ack before registered frame; accepting");
                            Ok(ws)
                        }
                        Err(e) => {
                            Err(TrailsError::Registration(format!("unreadable reply: {e}")))
                        }
                    }
                }
                Some(Ok(WsMessage::Close(_))) | None => Err(TrailsError::Registration(
                    "connection closed during registration".into(),
                )),
                Some(Ok(_)) => Err(TrailsError::Registration(
                    "expected a text reply to registration".into(),
                )),
                Some(Err(e)) => Err(e.into()),
            };
        }
    }

    /// Per-connection message loop; see module docs for the exit semantics.
    async fn stream(&mut self, ws: &mut WsStream) -> StreamExit {
        loop {
            if self.cancel.is_cancelled() {
                // The shutdown path enqueues a disconnect event before
                // cancelling; deliver it if it is already waiting.
                while let Some(event) = self.consumer.try_dequeue() {
                    if let OutboundEvent::Disconnect { reason } = event {
                        self.send_disconnect(ws, &reason).await;
                        break;
                    }
                }
                return StreamExit::Shutdown;
            }

            match self.consumer.dequeue_timeout(IDLE_POLL).await {
                Some(OutboundEvent::Disconnect { reason }) => {
                    self.send_disconnect(ws, &reason).await;
                    return StreamExit::Shutdown;
                }
                Some(OutboundEvent::Message(msg)) => {
                    self.last_seq = msg.seq;
                    let json = match self.encode_message(&msg) {
                        Ok(json) => json,
                        Err(e) => {
                            // An unserializable payload cannot succeed on
                            // retry either; drop it.
                            warn!(seq = msg.seq, "failed to encode event: {e}");
                            continue;
                        }
                    };
                    if let Err(e) = ws.send(WsMessage::Text(json)).await {
                        debug!(seq = msg.seq, "send failed, re-enqueueing: {e}");
                        // Best-effort: silently dropped if the queue is full.
                        self.requeue.enqueue(OutboundEvent::Message(msg));
                        return StreamExit::ConnectionLost;
                    }
                    match tokio::time::timeout(SEND_ACK_TIMEOUT, ws.next()).await {
                        Err(_) => {} // ack may be batched
                        Ok(Some(Ok(frame))) => {
                            if !self.note_incoming(frame) {
                                return StreamExit::ConnectionLost;
                            }
                        }
                        Ok(Some(Err(e))) => {
                            debug!("recv error while awaiting ack: {e}");
                            return StreamExit::ConnectionLost;
                        }
                        Ok(None) => return StreamExit::ConnectionLost,
                    }
                }
                None => {
                    // Idle: give unsolicited relay frames a read window.
                    match tokio::time::timeout(IDLE_POLL, ws.next()).await {
                        Err(_) => {} // nothing from the relay either
                        Ok(Some(Ok(frame))) => {
                            if !self.note_incoming(frame) {
                                return StreamExit::ConnectionLost;
                            }
                        }
                        Ok(Some(Err(e))) => {
                            debug!("recv error: {e}");
                            return StreamExit::ConnectionLost;
                        }
                        Ok(None) => return StreamExit::ConnectionLost,
                    }
                }
            }
        }
    }

    /// Consumes one inbound frame. Returns false when the connection is done.
    fn note_incoming(&self, frame: WsMessage) -> bool {
        match frame {
            WsMessage::Text(text) => {
                match serde_json::from_str::<ServerFrame>(&text) {
                    Ok(ServerFrame::Ack(ack)) => debug!(seq = ack.seq, "relay acknowledged"),
                    Ok(ServerFrame::Error(err)) => {
                        warn!(code = %err.code, "relay reported error: {}", err.message);
                    }
                    Ok(ServerFrame::Registered(_)) => {
                        debug!("late registration acknowledgment");
                    }
                    // Control frames land here once that protocol exists;
                    // until then unknown frames are drained and logged.
                    Err(_) => debug!("unrecognized relay frame: {text}"),
                }
                true
            }
            WsMessage::Close(_) => {
                info!("relay closed the connection");
                false
            }
            _ => true, // ping/pong/binary
        }
    }

    /// Sends the `disconnect` frame, best-effort.
    async fn send_disconnect(&self, ws: &mut WsStream, reason: &str) {
        let frame = ClientFrame::Disconnect(DisconnectFrame {
            app_id: self.config.app_id,
            reason: reason.into(),
        });
        match serde_json::to_string(&frame) {
            Ok(json) => {
                if let Err(e) = ws.send(WsMessage::Text(json)).await {
                    debug!("disconnect frame not delivered: {e}");
                } else {
                    info!(reason, "disconnect frame sent");
                }
            }
            Err(e) => debug!("failed to encode disconnect frame: {e}"),
        }
    }

    /// Builds the wire form of a pending message, stamping the timestamp at
    /// transmission time.
    fn encode_message(&self, msg: &PendingMessage) -> Result<String, TrailsError> {
        self.encode_signed(ClientFrame::Message(MessageFrame {
            app_id: self.config.app_id,
            header: MsgHeader {
                msg_type: msg.msg_type,
                timestamp: chrono::Utc::now().timestamp_millis(),
                seq: msg.seq,
                correlation_id: msg.correlation_id.clone(),
            },
            payload: msg.payload.clone(),
            sig: None,
        }))
    }

    /// Serializes a frame, offering the unsigned bytes to the signer.
    ///
    /// With the placeholder signer this leaves `sig` null on every frame.
    fn encode_signed(&self, frame: ClientFrame) -> Result<String, TrailsError> {
        let unsigned = serde_json::to_vec(&frame)?;
        let frame = frame.with_sig(self.signer.sign(&unsigned));
        Ok(serde_json::to_string(&frame)?)
    }

    /// Records a state transition and notifies watchers, skipping no-ops.
    fn set_state(&self, state: ConnectionState) {
        if *self.state_tx.borrow() != state {
            info!(state = state.as_str(), "connection state changed");
            let _ = self.state_tx.send(state);
        }
    }

    /// Marks the connection lost and sleeps out the next backoff delay,
    /// waking early if shutdown is requested.
    async fn fail_and_backoff(&mut self) {
        self.connected.store(false, Ordering::Release);
        self.set_state(ConnectionState::Disconnected);
        if self.cancel.is_cancelled() {
            return;
        }
        let delay = self.backoff.next_delay();
        debug!(
            attempt = self.backoff.attempt(),
            delay_ms = delay.as_millis() as u64,
            "reconnecting after backoff"
        );
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
