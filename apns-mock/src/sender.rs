//! Reply delivery: the outbound half of a connection.
//!
//! The receive task pushes [`Scheduled`] replies into an unbounded channel.
//! [`deliver`] pulls them into a min-heap keyed by deadline and writes each one
//! once its deadline passes.  Deadlines are independent per reply, so write
//! order follows deadline order, not arrival order.  Equal deadlines keep
//! arrival order.
//!
//! # Stop conditions
//! - a reply with status 255 has been written (`Terminated`);
//! - the connection asked for shutdown after malformed input (`Shutdown`);
//!   pending replies are discarded unsent;
//! - the queue closed and nothing is pending (`QueueClosed`);
//! - a write failed (`WriteFailed`).
//!
//! The outbound half is shut down on every path before returning.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::io;
use std::time::Duration;

use tokio::io::AsyncWrite;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use crate::reply::{Acknowledgement, ReplyEncoder};

/// A reply waiting for its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scheduled {
    pub deadline: Instant,
    /// Arrival order; breaks ties between equal deadlines.
    pub seq: u64,
    pub ack: Acknowledgement,
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.deadline, self.seq).cmp(&(other.deadline, other.seq))
    }
}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Why delivery stopped.
#[derive(Debug)]
pub enum DeliveryEnd {
    Terminated,
    Shutdown,
    QueueClosed,
    WriteFailed(io::Error),
}

#[derive(Debug)]
pub struct DeliveryReport {
    pub sent: u64,
    /// Replies still pending when delivery stopped.
    pub discarded: usize,
    pub end: DeliveryEnd,
}

/// Run the delivery loop until one of the stop conditions holds.
///
/// `ready` is signalled once the loop is about to consume the queue.
pub async fn deliver<W>(
    mut encoder: ReplyEncoder<W>,
    mut queue: mpsc::UnboundedReceiver<Scheduled>,
    mut shutdown: oneshot::Receiver<()>,
    ready: oneshot::Sender<()>,
) -> DeliveryReport
where
    W: AsyncWrite + Unpin,
{
    let _ = ready.send(());

    let mut pending: BinaryHeap<Reverse<Scheduled>> = BinaryHeap::new();
    let mut queue_open = true;
    let mut sent = 0u64;

    // Parked far in the future while nothing is pending; the `!is_empty`
    // guard in select! keeps it from firing in that state.
    let far_future = Duration::from_secs(365 * 24 * 3600);
    let timer = tokio::time::sleep(far_future);
    tokio::pin!(timer);

    let end = loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => {
                // Count replies still in flight in the channel as discarded too.
                while let Ok(scheduled) = queue.try_recv() {
                    pending.push(Reverse(scheduled));
                }
                break DeliveryEnd::Shutdown;
            }

            item = queue.recv(), if queue_open => match item {
                Some(scheduled) => pending.push(Reverse(scheduled)),
                None => queue_open = false,
            },

            _ = &mut timer, if !pending.is_empty() => {
                let Some(Reverse(due)) = pending.pop() else { continue };
                if let Err(e) = encoder.send(&due.ack).await {
                    break DeliveryEnd::WriteFailed(e);
                }
                sent += 1;
                log::debug!(
                    "[deliver] → reply id={} status={} seq={}",
                    due.ack.identifier,
                    due.ack.status,
                    due.seq
                );
                if due.ack.terminates() {
                    break DeliveryEnd::Terminated;
                }
            }
        }

        if !queue_open && pending.is_empty() {
            break DeliveryEnd::QueueClosed;
        }
        let next = pending
            .peek()
            .map_or_else(|| Instant::now() + far_future, |Reverse(s)| s.deadline);
        timer.as_mut().reset(next);
    };

    if let Err(e) = encoder.shutdown().await {
        log::trace!("[deliver] shutdown after {end:?}: {e}");
    }

    DeliveryReport {
        sent,
        discarded: pending.len(),
        end,
    }
}
