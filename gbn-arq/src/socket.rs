//! Async UDP socket abstraction.
//!
//! [`Socket`] is a thin wrapper around `tokio::net::UdpSocket` that hands out
//! decoded [`Frame`]s instead of raw bytes.  All protocol logic lives
//! elsewhere; this module owns only datagram I/O.

use std::net::SocketAddr;

use thiserror::Error;
use tokio::net::UdpSocket;

use crate::frame::{Frame, FrameError, MAX_FRAME_LEN};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can arise from socket or link operations.
#[derive(Debug, Error)]
pub enum SocketError {
    /// Underlying I/O error from the OS.  Fatal to the loop that hit it.
    #[error("socket I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The received datagram did not parse.  Isolated to that datagram.
    #[error("malformed frame: {0}")]
    Frame(#[from] FrameError),
    /// The in-memory peer went away.
    #[error("link closed")]
    Closed,
}

impl SocketError {
    /// `true` for errors that only affect the current datagram.
    pub fn is_malformed(&self) -> bool {
        matches!(self, SocketError::Frame(_))
    }
}

// ---------------------------------------------------------------------------
// Socket
// ---------------------------------------------------------------------------

/// An async, frame-oriented UDP socket.
///
/// All methods are `&self` so the socket can be shared across tasks.
#[derive(Debug)]
pub struct Socket {
    /// Address this socket is bound to (filled in after OS assigns ephemeral port).
    pub local_addr: SocketAddr,
    inner: UdpSocket,
}

impl Socket {
    /// Bind a new socket to `local_addr`.
    ///
    /// Passing `127.0.0.1:0` lets the OS choose an ephemeral port.
    pub async fn bind(local_addr: SocketAddr) -> Result<Self, SocketError> {
        let inner = UdpSocket::bind(local_addr).await?;
        let local_addr = inner.local_addr()?;
        Ok(Self { local_addr, inner })
    }

    /// Send an already encoded frame as one datagram to `dest`.
    pub async fn send_bytes(&self, bytes: &[u8], dest: SocketAddr) -> Result<(), SocketError> {
        self.inner.send_to(bytes, dest).await?;
        Ok(())
    }

    /// Encode `frame` and send it as a single datagram to `dest`.
    pub async fn send_to(&self, frame: &Frame, dest: SocketAddr) -> Result<(), SocketError> {
        let bytes = frame.encode()?;
        self.send_bytes(&bytes, dest).await
    }

    /// Receive the next datagram and decode it into a [`Frame`].
    ///
    /// Returns `(frame, sender_address)`.  Datagrams that fail to decode are
    /// returned as [`SocketError::Frame`]; the caller decides whether to
    /// keep reading.
    pub async fn recv_from(&self) -> Result<(Frame, SocketAddr), SocketError> {
        let mut buf = vec![0u8; MAX_FRAME_LEN + 1];
        let (n, addr) = self.inner.recv_from(&mut buf).await?;
        let frame = Frame::decode(&buf[..n])?;
        Ok((frame, addr))
    }
}
