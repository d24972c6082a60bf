//! Endpoint wiring: tasks, links and shutdown.
//!
//! A [`SenderEndpoint`] runs three concurrent activities:
//!
//! ```text
//!  PacketSource ──queue──▶ Sender::run ──Channel──▶ Outlet ─ ─ ▶ peer
//!                              ▲
//!  peer ─ ─ ▶ Inlet ──ack num──┘   (forward_acks task)
//! ```
//!
//! A [`ReceiverEndpoint`] is a single loop: decode, offer to the
//! [`Receiver`], send the resulting ACK back through its own [`Channel`].
//!
//! [`Simulation`] connects one of each, either over in-memory links or over
//! two loopback UDP sockets, and runs them to completion.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use crate::channel::{Channel, ChannelCounters};
use crate::config::{ArqConfig, ChannelConfig, ConfigError};
use crate::frame::Frame;
use crate::link::{memory_pair, Inlet, Outlet};
use crate::receiver::Receiver;
use crate::sender::{ArqError, Sender, SenderReport};
use crate::socket::{Socket, SocketError};
use crate::source::{outgoing_queue, PacketSource};
use crate::stats::StatisticsCollector;

/// Resolve once `shutdown` reads `true`.  A dropped controller never stops
/// anything, so this then pends forever.
pub(crate) async fn stop_requested(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

fn ack_channel_config(forward: &ChannelConfig) -> ChannelConfig {
    ChannelConfig {
        seed: forward.seed.map(|seed| seed.wrapping_add(1)),
        ..forward.clone()
    }
}

// ---------------------------------------------------------------------------
// SenderEndpoint
// ---------------------------------------------------------------------------

/// Sending entity plus the tasks that feed it.
pub struct SenderEndpoint {
    config: ArqConfig,
    channel: Arc<Channel>,
    stats: Arc<StatisticsCollector>,
    outlet: Outlet,
    inlet: Inlet,
}

impl SenderEndpoint {
    /// Wire a sender to an existing link.  Fails if `config` is inconsistent.
    pub fn new(config: ArqConfig, outlet: Outlet, inlet: Inlet) -> Result<Self, ArqError> {
        config.validate()?;
        if config.timeout_below_round_trip() {
            log::warn!(
                "[gbn:tx] timeout {:?} does not exceed the worst-case round trip {:?}; \
                 expect spurious retransmissions",
                config.timeout,
                config.channel.max_delay * 2
            );
        }
        Ok(Self {
            channel: Arc::new(Channel::new(config.channel.clone())),
            stats: Arc::new(StatisticsCollector::new()),
            config,
            outlet,
            inlet,
        })
    }

    /// Bind `local` and exchange frames with the receiver at `peer`.
    pub async fn bind_udp(
        config: ArqConfig,
        local: SocketAddr,
        peer: SocketAddr,
    ) -> Result<Self, ArqError> {
        let socket = Arc::new(Socket::bind(local).await?);
        log::info!("[gbn:tx] bound {} → peer {peer}", socket.local_addr);
        Self::new(
            config,
            Outlet::udp(Arc::clone(&socket), peer),
            Inlet::udp(socket, peer),
        )
    }

    /// Forward-path channel; scripted drops go here.
    pub fn channel(&self) -> &Arc<Channel> {
        &self.channel
    }

    pub fn stats(&self) -> &Arc<StatisticsCollector> {
        &self.stats
    }

    /// Generate `config.total_packets` payloads and send them all.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<SenderReport, ArqError> {
        let (queue, queue_rx) = outgoing_queue();
        let source = PacketSource::new(
            self.config.total_packets,
            self.config.min_gen_interval,
            self.config.max_gen_interval,
            self.config.seed,
        );
        let producer = tokio::spawn(source.run(queue, shutdown.clone()));

        let result = self.run_with_queue(queue_rx, shutdown).await;
        producer.abort();
        result
    }

    /// Send payloads taken from `queue_rx` until `config.total_packets` of
    /// them are acknowledged.
    pub async fn run_with_queue(
        self,
        queue_rx: mpsc::UnboundedReceiver<Vec<u8>>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<SenderReport, ArqError> {
        let (ack_tx, ack_rx) = mpsc::unbounded_channel();
        let inbound = tokio::spawn(forward_acks(self.inlet, ack_tx));

        let sender = Sender::new(
            self.config,
            queue_rx,
            self.channel,
            self.outlet,
            self.stats,
        );
        match sender.run(ack_rx, shutdown).await {
            Err(ArqError::AckPathClosed) => match inbound.await {
                Ok(Err(e)) => Err(e.into()),
                Ok(Ok(())) => Err(ArqError::AckPathClosed),
                Err(e) => Err(e.into()),
            },
            other => {
                inbound.abort();
                other
            }
        }
    }
}

/// Decode inbound frames and hand ACK numbers to the sender.
async fn forward_acks(mut inlet: Inlet, acks: mpsc::UnboundedSender<u32>) -> Result<(), SocketError> {
    loop {
        match inlet.recv().await {
            Ok(Frame::Ack { num }) => {
                if acks.send(num).is_err() {
                    return Ok(());
                }
            }
            Ok(frame) => log::debug!("[gbn:tx] ignoring unexpected {frame}"),
            Err(e) if e.is_malformed() => log::warn!("[gbn:tx] dropping malformed datagram: {e}"),
            Err(e) => {
                log::error!("[gbn:tx] inbound path failed: {e}");
                return Err(e);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// ReceiverEndpoint
// ---------------------------------------------------------------------------

/// Receiving entity: accepts frames in order and acknowledges every one.
pub struct ReceiverEndpoint {
    receiver: Receiver,
    channel: Arc<Channel>,
    outlet: Outlet,
    inlet: Inlet,
}

impl ReceiverEndpoint {
    /// `channel` impairs the ACK path back to the sender.
    pub fn new(seq_modulo: u32, channel: ChannelConfig, outlet: Outlet, inlet: Inlet) -> Result<Self, ArqError> {
        channel.validate()?;
        if seq_modulo < 2 {
            return Err(ConfigError::ModuloTooSmall {
                modulo: seq_modulo,
                window: 1,
            }
            .into());
        }
        Ok(Self {
            receiver: Receiver::new(seq_modulo),
            channel: Arc::new(Channel::new(channel)),
            outlet,
            inlet,
        })
    }

    /// Bind `local` and accept frames from the sender at `peer`.
    pub async fn bind_udp(
        seq_modulo: u32,
        channel: ChannelConfig,
        local: SocketAddr,
        peer: SocketAddr,
    ) -> Result<Self, ArqError> {
        let socket = Arc::new(Socket::bind(local).await?);
        log::info!("[gbn:rx] bound {} ← peer {peer}", socket.local_addr);
        Self::new(
            seq_modulo,
            channel,
            Outlet::udp(Arc::clone(&socket), peer),
            Inlet::udp(socket, peer),
        )
    }

    /// Reverse-path channel carrying ACKs.
    pub fn channel(&self) -> &Arc<Channel> {
        &self.channel
    }

    /// Serve until `shutdown` flips or the inbound path closes.  Returns the
    /// payloads delivered, in order.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<Vec<Vec<u8>>, ArqError> {
        loop {
            let inbound = tokio::select! {
                biased;
                _ = stop_requested(&mut shutdown) => break,
                inbound = self.inlet.recv() => inbound,
            };

            match inbound {
                Ok(Frame::Data { seq, payload }) => {
                    let delivery = self.receiver.on_frame(seq, &payload);
                    if delivery.is_accepted() {
                        log::info!(
                            "[gbn:rx] delivered seq={seq} {:?}",
                            String::from_utf8_lossy(&payload)
                        );
                    } else {
                        log::debug!(
                            "[gbn:rx] discarded seq={seq}, expecting {}",
                            self.receiver.expected_seq()
                        );
                    }
                    self.channel.transmit(delivery.ack(), &self.outlet).await?;
                }
                Ok(frame) => log::debug!("[gbn:rx] ignoring unexpected {frame}"),
                Err(e) if e.is_malformed() => log::warn!("[gbn:rx] dropping malformed datagram: {e}"),
                Err(SocketError::Closed) => {
                    log::debug!("[gbn:rx] inbound path closed");
                    break;
                }
                Err(e) => return Err(e.into()),
            }
        }

        log::info!("[gbn:rx] stopped after {} delivered packet(s)", self.receiver.delivered().len());
        Ok(self.receiver.into_delivered())
    }
}

// ---------------------------------------------------------------------------
// Simulation
// ---------------------------------------------------------------------------

/// Everything observed at the end of a [`Simulation`].
#[derive(Debug, Clone)]
pub struct SimulationOutcome {
    pub report: SenderReport,
    /// Payloads accepted by the receiver, in delivery order.
    pub delivered: Vec<Vec<u8>>,
    /// Counters of the ACK path.
    pub ack_channel: ChannelCounters,
}

/// One sender and one receiver connected back to back.
pub struct Simulation {
    sender: SenderEndpoint,
    receiver: ReceiverEndpoint,
}

impl Simulation {
    /// Connect both entities through in-memory links.
    pub fn in_memory(config: ArqConfig) -> Result<Self, ArqError> {
        let (data_out, data_in) = memory_pair();
        let (ack_out, ack_in) = memory_pair();
        let receiver = ReceiverEndpoint::new(
            config.seq_modulo,
            ack_channel_config(&config.channel),
            ack_out,
            data_in,
        )?;
        let sender = SenderEndpoint::new(config, data_out, ack_in)?;
        Ok(Self { sender, receiver })
    }

    /// Connect both entities through two ephemeral loopback UDP sockets.
    pub async fn over_udp(config: ArqConfig) -> Result<Self, ArqError> {
        let loopback: SocketAddr = ([127, 0, 0, 1], 0).into();
        let tx_socket = Arc::new(Socket::bind(loopback).await?);
        let rx_socket = Arc::new(Socket::bind(loopback).await?);
        let (tx_addr, rx_addr) = (tx_socket.local_addr, rx_socket.local_addr);

        let receiver = ReceiverEndpoint::new(
            config.seq_modulo,
            ack_channel_config(&config.channel),
            Outlet::udp(Arc::clone(&rx_socket), tx_addr),
            Inlet::udp(rx_socket, tx_addr),
        )?;
        let sender = SenderEndpoint::new(
            config,
            Outlet::udp(Arc::clone(&tx_socket), rx_addr),
            Inlet::udp(tx_socket, rx_addr),
        )?;
        Ok(Self { sender, receiver })
    }

    pub fn sender(&self) -> &SenderEndpoint {
        &self.sender
    }

    /// Run until the sender finishes, then stop the receiver.
    pub async fn run(self) -> Result<SimulationOutcome, ArqError> {
        let (stop_tx, stop_rx) = watch::channel(false);
        let ack_channel = Arc::clone(self.receiver.channel());
        let receiver = tokio::spawn(self.receiver.run(stop_rx.clone()));

        let report = self.sender.run(stop_rx).await;
        stop_tx.send_replace(true);
        let delivered = receiver.await.unwrap_or_else(|e| Err(e.into()));

        let (report, delivered) = settle(report, delivered)?;
        Ok(SimulationOutcome {
            report,
            delivered,
            ack_channel: ack_channel.counters(),
        })
    }
}

/// Combine both outcomes.  A sender failure takes precedence; a receiver
/// failure alongside it is only logged.
fn settle(
    report: Result<SenderReport, ArqError>,
    delivered: Result<Vec<Vec<u8>>, ArqError>,
) -> Result<(SenderReport, Vec<Vec<u8>>), ArqError> {
    match (report, delivered) {
        (Ok(report), Ok(delivered)) => Ok((report, delivered)),
        (Err(e), Err(rx_err)) => {
            log::warn!("[gbn:rx] receiver also failed: {rx_err}");
            Err(e)
        }
        (Err(e), Ok(_)) | (Ok(_), Err(e)) => Err(e),
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
