//! `gbn-arq` — Go-Back-N sliding-window ARQ over a simulated lossy channel.
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────────┐  payloads  ┌──────────┐  DATA frames  ┌─────────┐      ┌──────────┐
//!  │ PacketSource │───────────▶│  Sender  │──────────────▶│ Channel │─ ─ ─▶│ Receiver │
//!  └──────────────┘   queue    └────┬─────┘               │ (loss + │      └────┬─────┘
//!                                   │  ▲                  │  delay) │           │
//!                        delays /   │  │ ACK numbers      └─────────┘           │
//!                   retransmissions │  │                  ┌─────────┐           │
//!                                   ▼  └──────────────────│ Channel │◀─ ─ ─ ─ ─ ┘
//!                      ┌─────────────────────┐  ACK frames└─────────┘
//!                      │ StatisticsCollector │
//!                      └─────────────────────┘
//! ```
//!
//! The sender task is the only owner of the send window.  The inbound loop
//! only decodes and forwards ACK numbers, so `base`, `next_seq_num` and the
//! outstanding set never need a lock.
//!
//! Each module has a single responsibility:
//! - [`frame`]     — text wire format (`SEQ:<n>,DATA:<payload>` / `ACK:<n>`)
//! - [`config`]    — protocol and channel parameters with validation
//! - [`window`]    — send window bookkeeping (base, next, outstanding frames)
//! - [`sender`]    — Go-Back-N sender actor and its final report
//! - [`receiver`]  — strict in-order receiver with cumulative ACKs
//! - [`state`]     — sender state machine labels
//! - [`timer`]     — single retransmission timer
//! - [`channel`]   — probabilistic loss and uniform delay
//! - [`stats`]     — delay and retransmission statistics
//! - [`source`]    — randomised packet generator and outgoing queue
//! - [`link`]      — UDP and in-memory frame paths
//! - [`socket`]    — async UDP socket abstraction
//! - [`endpoint`]  — task wiring for sender, receiver and whole simulations

pub mod channel;
pub mod config;
pub mod endpoint;
pub mod frame;
pub mod link;
pub mod receiver;
pub mod sender;
pub mod socket;
pub mod source;
pub mod state;
pub mod stats;
pub mod timer;
pub mod window;

pub use config::{ArqConfig, ChannelConfig};
pub use endpoint::{ReceiverEndpoint, SenderEndpoint, Simulation, SimulationOutcome};
pub use frame::Frame;
pub use sender::{ArqError, SenderReport};
