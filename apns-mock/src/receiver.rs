//! Notification ingestion: the inbound half of a connection.
//!
//! [`Receiver::run`] loops over decode → policy → fault injection → schedule.
//! It never writes to the stream; each reply that survives the policy and
//! fault model is handed to the delivery task with a deadline
//! `now + delay`.  Ingestion therefore never waits on a pending reply.
//!
//! The loop ends on the first decode or policy error, or right after it
//! schedules a reply with status 255.

use rand::rngs::StdRng;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::config::ProcessConfig;
use crate::delay::DelaySampler;
use crate::error::ConnError;
use crate::faults::FaultConfig;
use crate::frame::FrameDecoder;
use crate::sender::Scheduled;
use crate::simulator::ReplyPolicy;

/// Counters kept by the receive task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiveStats {
    /// Notifications fully decoded.
    pub received: u64,
    /// Replies handed to the delivery task.
    pub scheduled: u64,
    /// Replies computed but deliberately not sent.
    pub withheld: u64,
}

/// Why the receive loop stopped.
#[derive(Debug)]
pub enum ReceiveEnd {
    /// A terminating reply was scheduled; no further input is read.
    Terminated,
    /// The delivery task stopped first.
    DeliveryGone,
    Failed(ConnError),
}

enum Flow {
    Continue,
    Terminate,
    DeliveryGone,
}

pub struct Receiver<R> {
    reader: R,
    decoder: FrameDecoder,
    policy: Box<dyn ReplyPolicy>,
    faults: FaultConfig,
    delay: DelaySampler,
    rng: StdRng,
    queue: mpsc::UnboundedSender<Scheduled>,
    label: String,
    pub stats: ReceiveStats,
}

impl<R: AsyncRead + Unpin> Receiver<R> {
    pub fn new(
        reader: R,
        policy: Box<dyn ReplyPolicy>,
        config: &ProcessConfig,
        rng: StdRng,
        queue: mpsc::UnboundedSender<Scheduled>,
        label: String,
    ) -> Self {
        Self {
            reader,
            decoder: config.decoder(),
            policy,
            faults: config.faults,
            delay: config.delay,
            rng,
            queue,
            label,
            stats: ReceiveStats::default(),
        }
    }

    /// Run until input fails or a terminating reply has been scheduled.
    pub async fn run(&mut self) -> ReceiveEnd {
        loop {
            match self.step().await {
                Ok(Flow::Continue) => {}
                Ok(Flow::Terminate) => return ReceiveEnd::Terminated,
                Ok(Flow::DeliveryGone) => return ReceiveEnd::DeliveryGone,
                Err(e) => return ReceiveEnd::Failed(e),
            }
        }
    }

    async fn step(&mut self) -> Result<Flow, ConnError> {
        let notification = self.decoder.decode(&mut self.reader).await?;
        self.stats.received += 1;

        let response = self.policy.respond(&notification)?;
        let response = self.faults.apply(response, &mut self.rng);

        if response.drop_reply {
            self.stats.withheld += 1;
            log::debug!(
                "[{}] ← {notification}; status={} withheld",
                self.label,
                response.ack.status
            );
            return Ok(Flow::Continue);
        }

        let delay = self.delay.sample(&mut self.rng);
        let scheduled = Scheduled {
            deadline: Instant::now() + delay,
            seq: self.stats.scheduled,
            ack: response.ack,
        };
        log::debug!(
            "[{}] ← {notification}; status={} in {delay:?}",
            self.label,
            response.ack.status
        );

        if self.queue.send(scheduled).is_err() {
            log::debug!("[{}] delivery gone; stop reading", self.label);
            return Ok(Flow::DeliveryGone);
        }
        self.stats.scheduled += 1;

        if response.ack.terminates() {
            Ok(Flow::Terminate)
        } else {
            Ok(Flow::Continue)
        }
    }
}
