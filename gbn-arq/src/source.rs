//! Packet generation and the outgoing queue.
//!
//! [`PacketSource`] produces `total_packets` payloads (`Packet-0`,
//! `Packet-1`, …) separated by uniformly random pauses and pushes them onto an
//! unbounded single-producer/single-consumer queue drained by the sender.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::{mpsc, watch};

use crate::endpoint::stop_requested;

/// Producer half of the outgoing queue.
#[derive(Debug, Clone)]
pub struct OutgoingQueue {
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

/// Create the queue between a producer and one sender.
pub fn outgoing_queue() -> (OutgoingQueue, mpsc::UnboundedReceiver<Vec<u8>>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (OutgoingQueue { tx }, rx)
}

impl OutgoingQueue {
    /// Append a payload.  Never blocks; a payload offered after the sender
    /// has stopped is discarded.
    pub fn enqueue(&self, payload: impl Into<Vec<u8>>) {
        if self.tx.send(payload.into()).is_err() {
            log::debug!("[src] sender gone; payload discarded");
        }
    }
}

/// Payload text for the `index`-th generated packet.
pub fn payload_for(index: u64) -> Vec<u8> {
    format!("Packet-{index}").into_bytes()
}

/// Randomised packet generator.
#[derive(Debug)]
pub struct PacketSource {
    total: u64,
    min_interval: Duration,
    max_interval: Duration,
    rng: StdRng,
}

impl PacketSource {
    pub fn new(total: u64, min_interval: Duration, max_interval: Duration, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            total,
            min_interval,
            max_interval,
            rng,
        }
    }

    fn next_interval(&mut self) -> Duration {
        let min = self.min_interval.as_nanos() as u64;
        let max = self.max_interval.as_nanos() as u64;
        if min >= max {
            return self.min_interval;
        }
        Duration::from_nanos(self.rng.random_range(min..=max))
    }

    /// Generate every packet, pausing before each one.  Returns the number of
    /// packets produced, which is short of `total` only when `shutdown`
    /// flipped first.
    pub async fn run(mut self, queue: OutgoingQueue, mut shutdown: watch::Receiver<bool>) -> u64 {
        for index in 0..self.total {
            let pause = self.next_interval();
            if !pause.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(pause) => {}
                    _ = stop_requested(&mut shutdown) => {
                        log::debug!("[src] stopped after {index} packet(s)");
                        return index;
                    }
                }
            } else if *shutdown.borrow() {
                return index;
            }
            queue.enqueue(payload_for(index));
            log::debug!("[src] generated packet {index}");
        }
        self.total
    }
}
