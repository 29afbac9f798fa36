//! Per-connection processor.
//!
//! A [`Connection`] wraps one already-secured byte stream.  [`Connection::process`]
//! splits it and runs two cooperating halves until the connection is done:
//!
//! ```text
//!            ┌──────────────────────── process() ─────────────────────────┐
//!  stream ──▶│ ReadHalf ─▶ Receiver ── Scheduled ──▶ deliver ─▶ WriteHalf │──▶ stream
//!            │   (this task)        unbounded mpsc   (spawned task)      │
//!            └────────────────────────────────────────────────────────────┘
//! ```
//!
//! The queue is the only state the two halves share.  Startup is gated on a
//! `ready` signal from the delivery task, so nothing is decoded before a
//! consumer exists.
//!
//! # Close discipline
//!
//! Whichever half stops first decides the close path:
//! - receive stops on malformed input or a policy error: pending replies are
//!   discarded (`shutdown` signal) and delivery is awaited;
//! - receive hits end of stream: replies already scheduled are still written
//!   (the peer may only have half-closed), then delivery ends once the queue
//!   is empty;
//! - receive stops after scheduling a status-255 reply: delivery writes up to
//!   and including that reply, then shuts the outbound half;
//! - delivery stops first (write failure): the receive future is dropped,
//!   which releases the read half.
//!
//! Either way the stream is released once, when both halves are dropped, and
//! the state reaches [`ConnectionState::Closed`] only after that.

use std::io;

use rand::rngs::StdRng;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot, watch};

use crate::config::ProcessConfig;
use crate::error::ConnError;
use crate::receiver::{ReceiveEnd, Receiver};
use crate::reply::ReplyEncoder;
use crate::sender::{deliver, DeliveryEnd, DeliveryReport};
use crate::simulator::ReplyPolicy;
use crate::state::ConnectionState;

// ---------------------------------------------------------------------------
// Outcome types
// ---------------------------------------------------------------------------

/// How a connection ended.
#[derive(Debug)]
pub enum CloseReason {
    /// The peer disconnected at a message boundary or mid-message.
    PeerClosed,
    /// A status-255 reply was sent.
    Terminated,
    /// Malformed input, a non-disconnect read error, or a policy failure.
    Failed(ConnError),
    /// Writing a reply failed.
    WriteFailed(io::Error),
}

/// Counters and close reason for one processed connection.
#[derive(Debug)]
pub struct ConnectionSummary {
    pub received: u64,
    /// Replies actually written to the stream.
    pub replied: u64,
    pub withheld: u64,
    /// Replies scheduled but never written.
    pub discarded: usize,
    pub close: CloseReason,
}

enum FirstDone {
    Receive(ReceiveEnd),
    Delivery(DeliveryReport),
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// Handle over one accepted stream.
pub struct Connection<S> {
    stream: S,
    label: String,
    state: watch::Sender<ConnectionState>,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    pub fn new(stream: S) -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);
        Self {
            stream,
            label: "conn".to_owned(),
            state,
        }
    }

    /// Prefix used in this connection's log lines, usually the peer address.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Observe state transitions while [`Connection::process`] runs.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Serve the connection until it closes.
    ///
    /// `rng` drives reply delays and fault injection for this connection only.
    pub async fn process(
        self,
        policy: Box<dyn ReplyPolicy>,
        config: &ProcessConfig,
        rng: StdRng,
    ) -> ConnectionSummary {
        let Connection {
            stream,
            label,
            state,
        } = self;
        let (reader, writer) = tokio::io::split(stream);

        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (ready_tx, ready_rx) = oneshot::channel();

        let mut delivery = tokio::spawn(deliver(
            ReplyEncoder::new(writer),
            queue_rx,
            shutdown_rx,
            ready_tx,
        ));
        if ready_rx.await.is_err() {
            log::debug!("[{label}] delivery exited before ready");
        }

        state.send_replace(ConnectionState::Running);
        log::debug!("[{label}] state → {}", ConnectionState::Running);

        let mut receiver = Receiver::new(reader, policy, config, rng, queue_tx, label.clone());

        let first = tokio::select! {
            end = receiver.run() => FirstDone::Receive(end),
            joined = &mut delivery => FirstDone::Delivery(flatten(joined)),
        };

        state.send_replace(ConnectionState::Closing);
        log::debug!("[{label}] state → {}", ConnectionState::Closing);

        let stats = receiver.stats;
        let (end, report) = match first {
            FirstDone::Receive(end) => {
                if let ReceiveEnd::Failed(e) = &end {
                    if !is_disconnect(e) {
                        let _ = shutdown_tx.send(());
                    }
                }
                // Closes the queue and releases the read half.
                drop(receiver);
                (end, flatten(delivery.await))
            }
            FirstDone::Delivery(report) => {
                drop(receiver);
                log::debug!("[{label}] delivery stopped first: {:?}", report.end);
                (ReceiveEnd::DeliveryGone, report)
            }
        };

        let close = close_reason(end, report.end);
        log_close(&label, &close);

        state.send_replace(ConnectionState::Closed);
        log::debug!("[{label}] state → {}", ConnectionState::Closed);

        ConnectionSummary {
            received: stats.received,
            replied: report.sent,
            withheld: stats.withheld,
            discarded: report.discarded,
            close,
        }
    }
}

fn flatten(joined: Result<DeliveryReport, tokio::task::JoinError>) -> DeliveryReport {
    joined.unwrap_or_else(|e| DeliveryReport {
        sent: 0,
        discarded: 0,
        end: DeliveryEnd::WriteFailed(io::Error::other(e)),
    })
}

fn is_disconnect(e: &ConnError) -> bool {
    matches!(e, ConnError::Decode(d) if d.is_disconnect())
}

/// Pick the one reason reported for a closed connection.
///
/// What the receive side saw wins over a write failure: a peer that went
/// away usually breaks both directions.
fn close_reason(receive: ReceiveEnd, delivery: DeliveryEnd) -> CloseReason {
    match (receive, delivery) {
        (ReceiveEnd::Failed(e), _) if is_disconnect(&e) => CloseReason::PeerClosed,
        (ReceiveEnd::Failed(e), _) => CloseReason::Failed(e),
        (_, DeliveryEnd::WriteFailed(e)) => CloseReason::WriteFailed(e),
        (ReceiveEnd::Terminated, _) | (_, DeliveryEnd::Terminated) => CloseReason::Terminated,
        (ReceiveEnd::DeliveryGone, _) => CloseReason::PeerClosed,
    }
}

fn log_close(label: &str, close: &CloseReason) {
    match close {
        CloseReason::PeerClosed => log::info!("[{label}] peer closed the connection"),
        CloseReason::Terminated => log::info!("[{label}] terminated after reply status 255"),
        CloseReason::Failed(e) => log::warn!("[{label}] closing connection: {e}"),
        CloseReason::WriteFailed(e) => log::debug!("[{label}] reply write failed: {e}"),
    }
}
