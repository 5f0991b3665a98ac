//! Bounded outbound event queue.
//!
//! The queue is the only structure shared between application threads and
//! the background connection manager, and its bound is the system's only
//! admission control. It is a bounded MPSC handoff: any number of producers
//! (`OutboundQueue` clones, cheap) against the single consumer owned by the
//! manager.
//!
//! Backpressure policy: when the queue is full, the **newest** event is
//! dropped and `enqueue` reports failure. The calling thread is never
//! blocked and retained entries are never evicted — liveness of the
//! application wins over completeness of telemetry.

use std::time::Duration;

use serde_json::Value as JsonValue;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;

use crate::wire::MsgType;

/// Default bound on pending events.
pub const DEFAULT_CAPACITY: usize = 1024;

/// An application event awaiting transmission.
///
/// The sequence number is assigned at enqueue time and never reused; the
/// transmission timestamp is stamped later, by the background loop, at send
/// time.
#[derive(Debug)]
pub enum OutboundEvent {
    Message(PendingMessage),
    /// Enqueued only by the shutdown path; makes the message loop send a
    /// `disconnect` frame and exit without reconnecting.
    Disconnect { reason: String },
}

#[derive(Debug)]
pub struct PendingMessage {
    pub msg_type: MsgType,
    pub seq: i64,
    pub payload: JsonValue,
    pub correlation_id: Option<String>,
}

/// Creates a bounded queue, returning the producer and consumer halves.
pub fn bounded(capacity: usize) -> (OutboundQueue, QueueConsumer) {
    let (tx, rx) = mpsc::channel(capacity);
    (OutboundQueue { tx }, QueueConsumer { rx })
}

/// Producer half; callable from any thread without blocking.
#[derive(Debug, Clone)]
pub struct OutboundQueue {
    tx: mpsc::Sender<OutboundEvent>,
}

impl OutboundQueue {
    /// Appends an event, or drops it if the queue is at capacity.
    ///
    /// Returns whether the event was accepted. Never blocks.
    pub fn enqueue(&self, event: OutboundEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!("outbound queue full; dropping newest event");
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!("outbound queue closed; dropping event");
                false
            }
        }
    }

    /// Configured bound of the queue.
    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}

/// Consumer half; owned by the single background loop.
#[derive(Debug)]
pub struct QueueConsumer {
    rx: mpsc::Receiver<OutboundEvent>,
}

impl QueueConsumer {
    /// Non-blocking poll.
    pub fn try_dequeue(&mut self) -> Option<OutboundEvent> {
        self.rx.try_recv().ok()
    }

    /// Waits up to `timeout` for the next event.
    ///
    /// The message loop polls with a short timeout so it can interleave
    /// sending with receiving unsolicited relay frames.
    pub async fn dequeue_timeout(&mut self, timeout: Duration) -> Option<OutboundEvent> {
        tokio::time::timeout(timeout, self.rx.recv())
            .await
            .ok()
            .flatten()
    }
}
