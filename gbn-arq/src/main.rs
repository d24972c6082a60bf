//! Entry point for `gbn`.
//!
//! Parses CLI arguments and dispatches into **sender**, **receiver** or
//! **simulate** mode.  All protocol work is delegated to library modules;
//! `main.rs` owns only process setup (logging, Ctrl-C handling, argument
//! parsing) and printing the final statistics.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use gbn_arq::{ArqConfig, ChannelConfig, ReceiverEndpoint, SenderEndpoint, Simulation};
use tokio::sync::watch;

/// Go-Back-N ARQ over a lossy, delaying UDP channel.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Generate packets and send them to a running receiver.
    Sender {
        /// Local address to bind.
        #[arg(short, long, default_value = "127.0.0.1:9001")]
        bind: SocketAddr,
        /// Receiver address.
        #[arg(short, long, default_value = "127.0.0.1:9000")]
        peer: SocketAddr,
        #[command(flatten)]
        params: ProtocolArgs,
    },
    /// Accept packets in order and acknowledge them until Ctrl-C.
    Receiver {
        /// Local address to bind.
        #[arg(short, long, default_value = "127.0.0.1:9000")]
        bind: SocketAddr,
        /// Sender address.
        #[arg(short, long, default_value = "127.0.0.1:9001")]
        peer: SocketAddr,
        #[command(flatten)]
        params: ProtocolArgs,
    },
    /// Run a sender and a receiver in this process and print statistics.
    Simulate {
        /// Exchange frames over loopback UDP instead of in-memory links.
        #[arg(long)]
        udp: bool,
        #[command(flatten)]
        params: ProtocolArgs,
    },
}

#[derive(Args)]
struct ProtocolArgs {
    /// Window size (W).
    #[arg(short = 'w', long, default_value_t = 7)]
    window: u32,
    /// Sequence number modulo (MOD); must exceed the window size.
    #[arg(short = 'm', long, default_value_t = 8)]
    modulo: u32,
    /// Minimum packet generation interval in ms (T1).
    #[arg(long, default_value_t = 100)]
    gen_min_ms: u64,
    /// Maximum packet generation interval in ms (T2).
    #[arg(long, default_value_t = 300)]
    gen_max_ms: u64,
    /// Minimum channel delay in ms (T3).
    #[arg(long, default_value_t = 50)]
    delay_min_ms: u64,
    /// Maximum channel delay in ms (T4).
    #[arg(long, default_value_t = 150)]
    delay_max_ms: u64,
    /// Probability that the channel drops a frame.
    #[arg(short = 'd', long = "drop", default_value_t = 0.1)]
    drop_probability: f64,
    /// Retransmission timeout in ms.
    #[arg(short = 't', long, default_value_t = 2000)]
    timeout_ms: u64,
    /// Number of packets to generate.
    #[arg(short = 'n', long, default_value_t = 30)]
    packets: u64,
    /// Consecutive timeouts before the sender gives up; 0 retries forever.
    #[arg(long, default_value_t = 8)]
    max_retries: u32,
    /// Seed for reproducible runs.
    #[arg(long)]
    seed: Option<u64>,
}

impl ProtocolArgs {
    fn into_config(self) -> ArqConfig {
        ArqConfig {
            window_size: self.window,
            seq_modulo: self.modulo,
            min_gen_interval: Duration::from_millis(self.gen_min_ms),
            max_gen_interval: Duration::from_millis(self.gen_max_ms),
            timeout: Duration::from_millis(self.timeout_ms),
            total_packets: self.packets,
            max_retries: (self.max_retries > 0).then_some(self.max_retries),
            seed: self.seed,
            channel: ChannelConfig {
                drop_probability: self.drop_probability,
                min_delay: Duration::from_millis(self.delay_min_ms),
                max_delay: Duration::from_millis(self.delay_max_ms),
                seed: self.seed,
            },
        }
    }
}

/// Flip the returned flag on Ctrl-C.
fn shutdown_on_ctrl_c() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Ctrl-C received, shutting down");
            tx.send_replace(true);
        }
    });
    rx
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();

    match cli.mode {
        Mode::Sender { bind, peer, params } => {
            let config = params.into_config();
            log::info!("Starting sender on {bind}, receiver at {peer}");
            let endpoint = SenderEndpoint::bind_udp(config, bind, peer)
                .await
                .context("failed to start sender")?;
            let report = endpoint.run(shutdown_on_ctrl_c()).await?;
            println!("{report}");
        }
        Mode::Receiver { bind, peer, params } => {
            let config = params.into_config();
            log::info!("Starting receiver on {bind}, sender at {peer}");
            let endpoint = ReceiverEndpoint::bind_udp(config.seq_modulo, config.channel, bind, peer)
                .await
                .context("failed to start receiver")?;
            let delivered = endpoint.run(shutdown_on_ctrl_c()).await?;
            println!("Delivered {} packet(s)", delivered.len());
        }
        Mode::Simulate { udp, params } => {
            let config = params.into_config();
            let simulation = if udp {
                Simulation::over_udp(config).await?
            } else {
                Simulation::in_memory(config)?
            };
            let outcome = simulation.run().await?;
            println!("{}", outcome.report);
            println!(
                "ACK channel loss: {} of {} frames",
                outcome.ack_channel.dropped, outcome.ack_channel.offered
            );
            println!("Receiver delivered {} packet(s) in order", outcome.delivered.len());
        }
    }

    Ok(())
}
