//! Go-Back-N sender.
//!
//! [`Sender`] is the single owner of the send window.  Nothing else reads or
//! writes `base`, `next_seq_num` or the outstanding set: ACK numbers reach it
//! as messages from the inbound loop, payloads arrive over the outgoing queue
//! and the retransmission deadline is its own timer.  [`Sender::run`]
//! multiplexes the three with `tokio::select!`:
//!
//! ```text
//!  outgoing queue ──payload──▶┐
//!  inbound loop  ───ack num──▶├──▶ Sender ──frame──▶ Channel ──▶ Outlet
//!  retransmit timer ─expiry──▶┘       │
//!                                     └──delay / retransmission──▶ StatisticsCollector
//! ```
//!
//! The loop ends with [`SenderState::Done`] once every configured packet has
//! been acknowledged.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::sync::watch;
use tokio::time::Instant;

use crate::channel::{Channel, ChannelCounters};
use crate::config::{ArqConfig, ConfigError};
use crate::endpoint::stop_requested;
use crate::frame::FrameError;
use crate::link::Outlet;
use crate::socket::SocketError;
use crate::state::SenderState;
use crate::stats::{StatisticsCollector, StatsSnapshot};
use crate::timer::RetransmitTimer;
use crate::window::SendWindow;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures that end a sender or receiver loop.
#[derive(Debug, Error)]
pub enum ArqError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("transport failure: {0}")]
    Transport(#[from] SocketError),
    #[error("cannot encode frame: {0}")]
    Frame(#[from] FrameError),
    #[error("gave up after {attempts} consecutive timeouts at base {base}")]
    RetriesExhausted { base: u64, attempts: u32 },
    #[error("acknowledgement path closed")]
    AckPathClosed,
    #[error("outgoing queue closed after {base} packet(s) were acknowledged")]
    SourceExhausted { base: u64 },
    #[error("stopped at base {base} before every packet was acknowledged")]
    Cancelled { base: u64 },
    #[error("endpoint task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

// ---------------------------------------------------------------------------
// SenderReport
// ---------------------------------------------------------------------------

/// Final figures published when the sender reaches [`SenderState::Done`].
#[derive(Debug, Clone)]
pub struct SenderReport {
    pub config: ArqConfig,
    pub stats: StatsSnapshot,
    /// Distinct data frames put on the channel (first transmissions only).
    pub packets_sent: u64,
    /// Final window base; equals `config.total_packets` on success.
    pub base: u64,
    /// Forward-path counters of the sender's channel.
    pub channel: ChannelCounters,
}

impl std::fmt::Display for SenderReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let c = &self.config;
        let s = &self.stats;
        writeln!(f, "---------------Statistics---------------")?;
        writeln!(f, "Parameters used in this simulation:")?;
        writeln!(f, "Window size: {}", c.window_size)?;
        writeln!(f, "Sequence modulo: {}", c.seq_modulo)?;
        writeln!(
            f,
            "Packet generation interval (T1..T2): {:?} .. {:?}",
            c.min_gen_interval, c.max_gen_interval
        )?;
        writeln!(
            f,
            "Transmission delay (T3..T4): {:?} .. {:?}",
            c.channel.min_delay, c.channel.max_delay
        )?;
        writeln!(f, "Packet drop probability: {}", c.channel.drop_probability)?;
        writeln!(f, "Timeout: {:?}", c.timeout)?;
        writeln!(f, "----------------------------------------")?;
        writeln!(f, "Total packets sent: {}", self.packets_sent)?;
        writeln!(f, "Total retransmissions: {}", s.total_retransmissions)?;
        writeln!(
            f,
            "Average delivery delay: {:.3} seconds",
            s.average_delay.as_secs_f64()
        )?;
        if let (Some(min), Some(max)) = (s.min_delay, s.max_delay) {
            writeln!(
                f,
                "Delivery delay range: {:.3} .. {:.3} seconds",
                min.as_secs_f64(),
                max.as_secs_f64()
            )?;
        }
        writeln!(f, "Retransmission rate: {:.2}", s.retransmission_rate)?;
        writeln!(
            f,
            "Average transmissions per packet: {:.2}",
            s.transmissions_per_packet()
        )?;
        write!(
            f,
            "Forward channel loss: {} of {} frames ({:.1}% observed, {:.1}% configured)",
            self.channel.dropped,
            self.channel.offered,
            self.channel.loss_rate() * 100.0,
            c.channel.drop_probability * 100.0
        )
    }
}

// ---------------------------------------------------------------------------
// Sender
// ---------------------------------------------------------------------------

/// Send-side entity for one stream.
pub struct Sender {
    config: ArqConfig,
    window: SendWindow,
    queue: mpsc::UnboundedReceiver<Vec<u8>>,
    queue_open: bool,
    channel: Arc<Channel>,
    outlet: Outlet,
    stats: Arc<StatisticsCollector>,
    timer: RetransmitTimer,
    state: SenderState,
    packets_sent: u64,
    consecutive_timeouts: u32,
}

impl Sender {
    /// Build a sender draining `queue` and transmitting through `channel`
    /// towards `outlet`.
    ///
    /// `config` must already have passed [`ArqConfig::validate`].
    pub fn new(
        config: ArqConfig,
        queue: mpsc::UnboundedReceiver<Vec<u8>>,
        channel: Arc<Channel>,
        outlet: Outlet,
        stats: Arc<StatisticsCollector>,
    ) -> Self {
        Self {
            window: SendWindow::new(config.window_size, config.seq_modulo),
            config,
            queue,
            queue_open: true,
            channel,
            outlet,
            stats,
            timer: RetransmitTimer::new(),
            state: SenderState::Idle,
            packets_sent: 0,
            consecutive_timeouts: 0,
        }
    }

    pub fn state(&self) -> SenderState {
        self.state
    }

    pub fn window(&self) -> &SendWindow {
        &self.window
    }

    pub fn packets_sent(&self) -> u64 {
        self.packets_sent
    }

    /// `true` once every configured packet has been acknowledged.
    pub fn is_done(&self) -> bool {
        self.window.base() >= self.config.total_packets
    }

    fn set_state(&mut self, next: SenderState) {
        if self.state != next {
            log::trace!("[gbn:tx] {} → {}", self.state, next);
            self.state = next;
        }
    }

    /// `true` while the window and the packet budget both allow a new frame.
    fn can_send_new(&self) -> bool {
        self.window.has_space() && self.window.next_seq_num() < self.config.total_packets
    }

    /// Assign a sequence number to `payload` and put it on the channel.
    async fn send_new(&mut self, payload: Vec<u8>) -> Result<(), ArqError> {
        let frame = self.window.push(payload, Instant::now());
        self.channel.transmit(&frame, &self.outlet).await?;
        self.stats.record_packet();
        self.packets_sent += 1;
        self.set_state(SenderState::Sending);
        log::debug!(
            "[gbn:tx] → {frame} base={} next={}",
            self.window.base(),
            self.window.next_seq_num()
        );
        Ok(())
    }

    /// Move queued payloads into the window until it is full or the queue
    /// is empty.  Returns the number of new frames sent.
    pub async fn fill_window(&mut self) -> Result<usize, ArqError> {
        let mut sent = 0;
        while self.can_send_new() {
            let payload = match self.queue.try_recv() {
                Ok(payload) => payload,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.queue_open = false;
                    break;
                }
            };
            self.send_new(payload).await?;
            sent += 1;
        }
        Ok(sent)
    }

    /// Apply a cumulative ACK.  Returns the number of frames it cleared; 0
    /// for an ACK outside the open window, which changes nothing.
    pub fn on_ack(&mut self, ack_num: u32) -> usize {
        let delays = self.window.on_ack(ack_num, Instant::now());
        if delays.is_empty() {
            log::debug!(
                "[gbn:tx] ← ACK {ack_num} outside window [{}, {}); ignored",
                self.window.base(),
                self.window.next_seq_num()
            );
            return 0;
        }

        for delay in &delays {
            self.stats.record_delay(*delay);
        }
        self.consecutive_timeouts = 0;
        log::debug!(
            "[gbn:tx] ← ACK {ack_num} cleared {} base={}",
            delays.len(),
            self.window.base()
        );
        if self.is_done() {
            self.set_state(SenderState::Done);
        }
        delays.len()
    }

    /// Resend every outstanding frame (the go-back-N step).  Returns the
    /// number of frames resent; each one counts as one retransmission.
    pub async fn on_timeout(&mut self) -> Result<usize, ArqError> {
        self.set_state(SenderState::OnTimeout);
        let frames = self.window.retransmit_all(Instant::now());
        log::info!(
            "[gbn:tx] timeout at base {}; resending {} frame(s)",
            self.window.base(),
            frames.len()
        );
        for frame in &frames {
            self.channel.transmit(frame, &self.outlet).await?;
            self.stats.record_retransmission();
        }
        self.consecutive_timeouts += 1;
        Ok(frames.len())
    }

    fn report(&self) -> SenderReport {
        SenderReport {
            config: self.config.clone(),
            stats: self.stats.snapshot(),
            packets_sent: self.packets_sent,
            base: self.window.base(),
            channel: self.channel.counters(),
        }
    }

    /// Drive the sender until every packet is acknowledged.
    ///
    /// `acks` carries ACK numbers decoded by the inbound loop.  Flipping
    /// `shutdown` to `true` ends the loop with [`ArqError::Cancelled`].
    pub async fn run(
        mut self,
        mut acks: mpsc::UnboundedReceiver<u32>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<SenderReport, ArqError> {
        let timeout = self.config.timeout;

        while !self.is_done() {
            if !self.queue_open && self.window.is_empty() {
                return Err(ArqError::SourceExhausted {
                    base: self.window.base(),
                });
            }
            self.timer
                .set(self.window.oldest_sent_at().map(|sent| sent + timeout));
            let take_payload = self.queue_open && self.can_send_new();
            if !take_payload && self.state != SenderState::Idle {
                self.set_state(SenderState::Waiting);
            }

            tokio::select! {
                _ = stop_requested(&mut shutdown) => {
                    log::info!("[gbn:tx] shutdown requested at base {}", self.window.base());
                    return Err(ArqError::Cancelled { base: self.window.base() });
                }

                maybe_ack = acks.recv() => match maybe_ack {
                    Some(ack_num) => {
                        if self.on_ack(ack_num) > 0 {
                            self.fill_window().await?;
                        }
                    }
                    None => return Err(ArqError::AckPathClosed),
                },

                maybe_payload = self.queue.recv(), if take_payload => match maybe_payload {
                    Some(payload) => {
                        self.send_new(payload).await?;
                        self.fill_window().await?;
                    }
                    None => {
                        log::debug!("[gbn:tx] outgoing queue closed");
                        self.queue_open = false;
                    }
                },

                _ = self.timer.expired(), if self.timer.is_armed() => {
                    if let Some(max) = self.config.max_retries {
                        if self.consecutive_timeouts >= max {
                            return Err(ArqError::RetriesExhausted {
                                base: self.window.base(),
                                attempts: self.consecutive_timeouts,
                            });
                        }
                    }
                    self.on_timeout().await?;
                }
            }
        }

        self.set_state(SenderState::Done);
        let report = self.report();
        log::info!(
            "[gbn:tx] done: {} packet(s), {} retransmission(s), avg delay {:?}",
            report.packets_sent,
            report.stats.total_retransmissions,
            report.stats.average_delay
        );
        Ok(report)
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
