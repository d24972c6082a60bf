//! Unreliable-link simulator.
//!
//! Every unit handed to [`Channel::transmit`] independently suffers:
//!
//! | Fault  | Description                                              |
//! |--------|----------------------------------------------------------|
//! | Loss   | Discarded with probability `drop_probability`.           |
//! | Delay  | Delivered after a uniform draw from `[min_delay, max_delay]`. |
//!
//! Each direction is FIFO.  Delayed units go through one delivery task per
//! channel and leave at `max(previous departure, hand-off + delay)`, so a
//! short draw never overtakes a long one.  A channel whose `max_delay` is
//! zero delivers inline.
//!
//! Loss is invisible to the protocol: `transmit` reports success for a
//! dropped unit.  Only [`Channel::counters`] records it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::config::ChannelConfig;
use crate::frame::{Frame, FrameError};
use crate::link::Outlet;

/// Units offered to and discarded by one channel direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelCounters {
    pub offered: u64,
    pub dropped: u64,
}

impl ChannelCounters {
    /// Fraction of offered units that were discarded.
    pub fn loss_rate(&self) -> f64 {
        if self.offered == 0 {
            return 0.0;
        }
        self.dropped as f64 / self.offered as f64
    }
}

/// One direction of the simulated link.
#[derive(Debug)]
pub struct Channel {
    config: ChannelConfig,
    rng: Mutex<StdRng>,
    /// Frames to discard on their next transmission, once each.
    scripted: Mutex<Vec<Frame>>,
    offered: AtomicU64,
    dropped: AtomicU64,
    pipeline: Mutex<Pipeline>,
}

/// Delivery queue feeding the channel's single delivery task.
#[derive(Debug, Default)]
struct Pipeline {
    tx: Option<mpsc::UnboundedSender<Scheduled>>,
    /// Departure time of the most recently queued unit.
    last_due: Option<Instant>,
}

#[derive(Debug)]
struct Scheduled {
    due: Instant,
    bytes: Vec<u8>,
    destination: Outlet,
    label: String,
}

enum Verdict {
    Drop,
    Deliver(Duration),
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Channel {
    pub fn new(config: ChannelConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            config,
            rng: Mutex::new(rng),
            scripted: Mutex::new(Vec::new()),
            offered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            pipeline: Mutex::new(Pipeline::default()),
        }
    }

    /// Force the next transmission of `frame` to be lost, regardless of the
    /// drop probability.  Later transmissions of the same frame are drawn
    /// normally.
    pub fn drop_once(&self, frame: Frame) {
        lock(&self.scripted).push(frame);
    }

    pub fn counters(&self) -> ChannelCounters {
        ChannelCounters {
            offered: self.offered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }

    /// Encode `frame` and push it through the simulated link towards
    /// `destination`.
    ///
    /// Only an encoding failure is reported.  Loss is silent, and a transport
    /// failure while delivering a delayed unit is logged by the delivery task.
    /// Units handed over earlier always arrive first.
    pub async fn transmit(&self, frame: &Frame, destination: &Outlet) -> Result<(), FrameError> {
        let bytes = frame.encode()?;
        self.offered.fetch_add(1, Ordering::Relaxed);

        let delay = match self.verdict(frame) {
            Verdict::Drop => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                log::debug!("[chan] dropped {frame}");
                return Ok(());
            }
            Verdict::Deliver(delay) => delay,
        };

        if self.config.max_delay.is_zero() {
            if let Err(e) = destination.deliver(bytes).await {
                log::warn!("[chan] delivery of {frame} failed: {e}");
            }
            return Ok(());
        }

        self.schedule(Scheduled {
            due: Instant::now() + delay,
            bytes,
            destination: destination.clone(),
            label: frame.to_string(),
        });
        Ok(())
    }

    /// Queue `unit` behind everything already in flight on this channel.
    fn schedule(&self, mut unit: Scheduled) {
        let mut pipeline = lock(&self.pipeline);
        if let Some(last_due) = pipeline.last_due {
            unit.due = unit.due.max(last_due);
        }
        pipeline.last_due = Some(unit.due);

        let tx = pipeline.tx.get_or_insert_with(|| {
            let (tx, rx) = mpsc::unbounded_channel();
            tokio::spawn(deliver_in_order(rx));
            tx
        });
        if let Err(mpsc::error::SendError(unit)) = tx.send(unit) {
            log::warn!("[chan] delivery task gone; {} lost", unit.label);
        }
    }

    fn verdict(&self, frame: &Frame) -> Verdict {
        {
            let mut scripted = lock(&self.scripted);
            if let Some(pos) = scripted.iter().position(|f| f == frame) {
                scripted.swap_remove(pos);
                return Verdict::Drop;
            }
        }

        let mut rng = lock(&self.rng);
        if rng.random::<f64>() < self.config.drop_probability {
            return Verdict::Drop;
        }
        let min = self.config.min_delay.as_nanos() as u64;
        let max = self.config.max_delay.as_nanos() as u64;
        if min >= max {
            return Verdict::Deliver(self.config.min_delay);
        }
        Verdict::Deliver(Duration::from_nanos(rng.random_range(min..=max)))
    }
}

/// Hand queued units to their destinations, each at its departure time.
async fn deliver_in_order(mut rx: mpsc::UnboundedReceiver<Scheduled>) {
    while let Some(unit) = rx.recv().await {
        tokio::time::sleep_until(unit.due).await;
        if let Err(e) = unit.destination.deliver(unit.bytes).await {
            log::warn!("[chan] delivery of {} failed: {e}", unit.label);
        }
    }
}
