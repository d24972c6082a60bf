//! The two ends of a point-to-point datagram path.
//!
//! An [`Outlet`] is where encoded frames are handed for delivery; an
//! [`Inlet`] is where the peer's frames come out.  Both exist in a UDP flavour
//! (two configured host/port endpoints) and an in-memory flavour built by
//! [`memory_pair`] for running both entities inside one process without
//! sockets.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::frame::Frame;
use crate::socket::{Socket, SocketError};

// ---------------------------------------------------------------------------
// Outlet
// ---------------------------------------------------------------------------

/// Sending side of a link.  Cheap to clone; clones share the same path.
#[derive(Debug, Clone)]
pub enum Outlet {
    Udp { socket: Arc<Socket>, peer: SocketAddr },
    Memory(mpsc::UnboundedSender<Vec<u8>>),
}

impl Outlet {
    pub fn udp(socket: Arc<Socket>, peer: SocketAddr) -> Self {
        Outlet::Udp { socket, peer }
    }

    /// Put one encoded frame on the path.
    pub async fn deliver(&self, bytes: Vec<u8>) -> Result<(), SocketError> {
        match self {
            Outlet::Udp { socket, peer } => socket.send_bytes(&bytes, *peer).await,
            Outlet::Memory(tx) => tx.send(bytes).map_err(|_| SocketError::Closed),
        }
    }
}

// ---------------------------------------------------------------------------
// Inlet
// ---------------------------------------------------------------------------

/// Receiving side of a link.
#[derive(Debug)]
pub enum Inlet {
    /// Datagrams from anyone other than `peer` are dropped.
    Udp { socket: Arc<Socket>, peer: SocketAddr },
    Memory(mpsc::UnboundedReceiver<Vec<u8>>),
}

impl Inlet {
    pub fn udp(socket: Arc<Socket>, peer: SocketAddr) -> Self {
        Inlet::Udp { socket, peer }
    }

    /// Wait for the next frame from the peer.
    ///
    /// [`SocketError::Frame`] means one bad datagram and the inlet is still
    /// usable; any other error is terminal.
    pub async fn recv(&mut self) -> Result<Frame, SocketError> {
        match self {
            Inlet::Udp { socket, peer } => loop {
                let (frame, addr) = socket.recv_from().await?;
                if addr == *peer {
                    return Ok(frame);
                }
                log::debug!("[link] ignoring datagram from unexpected {addr}");
            },
            Inlet::Memory(rx) => {
                let bytes = rx.recv().await.ok_or(SocketError::Closed)?;
                Ok(Frame::decode(&bytes)?)
            }
        }
    }
}

/// Build a connected in-memory path: frames delivered to the outlet come out
/// of the inlet in hand-off order.
pub fn memory_pair() -> (Outlet, Inlet) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Outlet::Memory(tx), Inlet::Memory(rx))
}
