//! Go-Back-N receive-side state machine.
//!
//! [`Receiver`] implements the strict in-order receiver:
//!
//! - Only the frame carrying `expected_seq` is accepted.
//! - Anything else is **discarded**, never buffered.
//! - Every data frame, accepted or not, is answered with a cumulative ACK:
//!   `expected_seq` on acceptance (before advancing), otherwise
//!   `expected_seq - 1 (mod MOD)`, the last position delivered.
//!
//! The receiver has no timer; the sender's timeout recovers from a lost ACK.
//! This module only manages state; sending the ACK is the caller's job.

use crate::frame::Frame;

/// Result of offering one data frame to the receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// In order; the payload joined the delivered sequence.
    Accepted { ack: Frame },
    /// Out of order or duplicate; the payload was discarded.
    Rejected { ack: Frame },
}

impl Delivery {
    /// The acknowledgement to send back in either case.
    pub fn ack(&self) -> &Frame {
        match self {
            Delivery::Accepted { ack } | Delivery::Rejected { ack } => ack,
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Delivery::Accepted { .. })
    }
}

/// Inbound state for one sender.
#[derive(Debug)]
pub struct Receiver {
    /// Next sequence number to accept, already reduced modulo `modulo`.
    expected_seq: u32,
    modulo: u32,
    /// Payloads accepted so far, in delivery order.
    delivered: Vec<Vec<u8>>,
}

impl Receiver {
    /// # Panics
    ///
    /// Panics if `modulo` is below 2.
    pub fn new(modulo: u32) -> Self {
        assert!(modulo >= 2, "sequence modulo must be at least 2");
        Self {
            expected_seq: 0,
            modulo,
            delivered: Vec::new(),
        }
    }

    pub fn expected_seq(&self) -> u32 {
        self.expected_seq
    }

    pub fn delivered(&self) -> &[Vec<u8>] {
        &self.delivered
    }

    pub fn into_delivered(self) -> Vec<Vec<u8>> {
        self.delivered
    }

    /// Last position handed to the application, modulo the sequence space.
    fn last_delivered(&self) -> u32 {
        (self.expected_seq + self.modulo - 1) % self.modulo
    }

    /// Process one inbound data frame.
    pub fn on_frame(&mut self, seq: u32, payload: &[u8]) -> Delivery {
        if seq == self.expected_seq {
            let ack = Frame::ack(self.expected_seq);
            self.delivered.push(payload.to_vec());
            self.expected_seq = (self.expected_seq + 1) % self.modulo;
            Delivery::Accepted { ack }
        } else {
            Delivery::Rejected {
                ack: Frame::ack(self.last_delivered()),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
