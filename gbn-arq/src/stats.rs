//! Thread-safe delivery statistics.
//!
//! Every mutation takes the collector's single lock, touches one field and
//! releases it.  [`StatisticsCollector::snapshot`] derives all aggregates
//! inside one critical section so the figures are mutually consistent.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug, Default)]
struct Statistics {
    delay_samples: Vec<Duration>,
    retransmissions: u64,
    total_packets: u64,
}

/// Shared sink for per-frame delays and retransmission counts.
#[derive(Debug, Default)]
pub struct StatisticsCollector {
    inner: Mutex<Statistics>,
}

/// Consistent point-in-time view of the collector.
#[derive(Debug, Clone, PartialEq)]
pub struct StatsSnapshot {
    pub average_delay: Duration,
    pub min_delay: Option<Duration>,
    pub max_delay: Option<Duration>,
    pub delay_samples: usize,
    /// `total_retransmissions / total_packets`, 0 when nothing was sent.
    pub retransmission_rate: f64,
    pub total_packets: u64,
    pub total_retransmissions: u64,
}

impl StatsSnapshot {
    /// Average number of times each frame went on the wire.
    pub fn transmissions_per_packet(&self) -> f64 {
        if self.total_packets == 0 {
            return 0.0;
        }
        (self.total_packets + self.total_retransmissions) as f64 / self.total_packets as f64
    }
}

impl StatisticsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    // Critical sections are single-field updates; a poisoned lock still
    // guards consistent data.
    fn lock(&self) -> MutexGuard<'_, Statistics> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record_delay(&self, delay: Duration) {
        self.lock().delay_samples.push(delay);
    }

    pub fn record_retransmission(&self) {
        self.lock().retransmissions += 1;
    }

    pub fn record_packet(&self) {
        self.lock().total_packets += 1;
    }

    /// Recorded delays in the order they were observed.
    pub fn delay_samples(&self) -> Vec<Duration> {
        self.lock().delay_samples.clone()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let stats = self.lock();
        let samples = &stats.delay_samples;

        let average_delay = if samples.is_empty() {
            Duration::ZERO
        } else {
            samples.iter().sum::<Duration>() / samples.len() as u32
        };
        let retransmission_rate = if stats.total_packets == 0 {
            0.0
        } else {
            stats.retransmissions as f64 / stats.total_packets as f64
        };

        StatsSnapshot {
            average_delay,
            min_delay: samples.iter().min().copied(),
            max_delay: samples.iter().max().copied(),
            delay_samples: samples.len(),
            retransmission_rate,
            total_packets: stats.total_packets,
            total_retransmissions: stats.retransmissions,
        }
    }
}
