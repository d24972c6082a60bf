//! Protocol and channel parameters.
//!
//! All knobs are explicit values handed to the endpoints; nothing is read
//! from files or the environment.  [`ArqConfig::validate`] must pass before a
//! sender or receiver is started.

use std::time::Duration;

use thiserror::Error;

// ---------------------------------------------------------------------------
// ChannelConfig
// ---------------------------------------------------------------------------

/// Impairments applied by [`crate::channel::Channel`] to every unit it
/// carries, in one direction.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelConfig {
    /// Probability `[0.0, 1.0]` that a unit is silently discarded.
    pub drop_probability: f64,
    /// Lower bound of the uniform transmission delay (T3).
    pub min_delay: Duration,
    /// Upper bound of the uniform transmission delay (T4).
    pub max_delay: Duration,
    /// RNG seed for reproducible drop / delay draws. `None` = entropy.
    pub seed: Option<u64>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            drop_probability: 0.1,
            min_delay: Duration::from_millis(50),
            max_delay: Duration::from_millis(150),
            seed: None,
        }
    }
}

impl ChannelConfig {
    /// No loss, no delay.  Units are handed over synchronously and in order.
    pub fn perfect() -> Self {
        Self {
            drop_probability: 0.0,
            min_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            seed: None,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.drop_probability) {
            return Err(ConfigError::DropProbability(self.drop_probability));
        }
        if self.min_delay > self.max_delay {
            return Err(ConfigError::DelayBounds {
                min: self.min_delay,
                max: self.max_delay,
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ArqConfig
// ---------------------------------------------------------------------------

/// Go-Back-N parameters shared by both endpoints.
#[derive(Debug, Clone, PartialEq)]
pub struct ArqConfig {
    /// Maximum number of outstanding frames (W).
    pub window_size: u32,
    /// Size of the sequence space (MOD).  Must exceed `window_size`.
    pub seq_modulo: u32,
    /// Lower bound of the packet generation interval (T1).
    pub min_gen_interval: Duration,
    /// Upper bound of the packet generation interval (T2).
    pub max_gen_interval: Duration,
    /// Age of the oldest outstanding frame that triggers a full resend.
    pub timeout: Duration,
    /// Number of packets the source produces; the sender stops once all of
    /// them are acknowledged.
    pub total_packets: u64,
    /// Consecutive timeouts without window progress before the sender gives
    /// up.  `None` retries forever.
    pub max_retries: Option<u32>,
    /// Seed for the packet source's interval draws. `None` = entropy.
    pub seed: Option<u64>,
    /// Forward and reverse path impairments.
    pub channel: ChannelConfig,
}

impl Default for ArqConfig {
    fn default() -> Self {
        Self {
            window_size: 7,
            seq_modulo: 8,
            min_gen_interval: Duration::from_millis(100),
            max_gen_interval: Duration::from_millis(300),
            timeout: Duration::from_secs(2),
            total_packets: 30,
            max_retries: Some(8),
            seed: None,
            channel: ChannelConfig::default(),
        }
    }
}

impl ArqConfig {
    /// Check every cross-field constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_size == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        if self.seq_modulo <= self.window_size {
            return Err(ConfigError::ModuloTooSmall {
                modulo: self.seq_modulo,
                window: self.window_size,
            });
        }
        if self.min_gen_interval > self.max_gen_interval {
            return Err(ConfigError::IntervalBounds {
                min: self.min_gen_interval,
                max: self.max_gen_interval,
            });
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.total_packets == 0 {
            return Err(ConfigError::NoPackets);
        }
        self.channel.validate()
    }

    /// `true` when an ACK can still be in flight after the timeout fires even
    /// on a loss-free channel, i.e. the timeout is not above one round trip.
    pub fn timeout_below_round_trip(&self) -> bool {
        self.timeout <= self.channel.max_delay * 2
    }
}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("window size must be at least 1")]
    ZeroWindow,
    #[error("sequence modulo {modulo} must exceed window size {window}")]
    ModuloTooSmall { modulo: u32, window: u32 },
    #[error("generation interval bounds reversed ({min:?} > {max:?})")]
    IntervalBounds { min: Duration, max: Duration },
    #[error("channel delay bounds reversed ({min:?} > {max:?})")]
    DelayBounds { min: Duration, max: Duration },
    #[error("drop probability {0} outside [0, 1]")]
    DropProbability(f64),
    #[error("timeout must be non-zero")]
    ZeroTimeout,
    #[error("total packet count must be at least 1")]
    NoPackets,
}
