//! Go-Back-N send window.
//!
//! [`SendWindow`] tracks up to `W` outstanding frames between `base` (oldest
//! unacknowledged) and `next_seq_num` (next to assign).
//!
//! # Protocol contract
//!
//! - At most `size` frames are outstanding: `next_seq_num - base <= size`.
//! - `base` and `next_seq_num` are **raw** counters that never wrap; only the
//!   sequence number written on the wire is reduced modulo `modulo`.
//! - ACKs are **cumulative**: `Ack{num}` covers the outstanding frame whose
//!   wire sequence is `num` and every frame before it.
//! - An ACK is mapped back to a raw position by its distance from `base` in
//!   the modulo space.  It is accepted only when that position lies inside
//!   `[base, next_seq_num)`; everything else is ignored.  Because
//!   `modulo > size`, distances `>= in_flight` can never denote an
//!   outstanding frame, so stale duplicates of `base - 1` are always
//!   rejected.
//!
//! This module only manages state; all channel I/O is the caller's
//! responsibility.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

use crate::frame::Frame;

// ---------------------------------------------------------------------------
// OutstandingFrame
// ---------------------------------------------------------------------------

/// A frame that has been sent but not yet covered by a cumulative ACK.
#[derive(Debug, Clone)]
pub struct OutstandingFrame {
    /// Raw, never-wrapping position of this frame in the stream.
    pub raw_seq: u64,
    /// The frame as it goes on the wire (wire `seq` is `raw_seq % modulo`).
    pub frame: Frame,
    /// Time of the first transmission; delivery delay is measured from here.
    pub first_sent_at: Instant,
    /// Time of the most recent (re)transmission; drives the timeout.
    pub last_sent_at: Instant,
}

// ---------------------------------------------------------------------------
// SendWindow
// ---------------------------------------------------------------------------

/// Sliding-window send state.
///
/// ```text
///     base          next_seq_num
///      │                  │
///  ────┼──────────────────┼──────────────▶ raw sequence
///      │ <── in flight ──▶│ <── usable ──▶ (up to base + size)
/// ```
#[derive(Debug)]
pub struct SendWindow {
    base: u64,
    next_seq_num: u64,
    size: u32,
    modulo: u32,
    /// Outstanding frames ordered by raw sequence (front = `base`).
    outstanding: VecDeque<OutstandingFrame>,
}

impl SendWindow {
    /// Create an empty window.
    ///
    /// # Panics
    ///
    /// Panics if `size` is zero or `modulo <= size`; use
    /// [`crate::config::ArqConfig::validate`] first.
    pub fn new(size: u32, modulo: u32) -> Self {
        assert!(size >= 1, "window size must be at least 1");
        assert!(modulo > size, "sequence modulo must exceed the window size");
        Self {
            base: 0,
            next_seq_num: 0,
            size,
            modulo,
            outstanding: VecDeque::with_capacity(size as usize),
        }
    }

    /// Raw position of the oldest unacknowledged frame.
    pub fn base(&self) -> u64 {
        self.base
    }

    /// Raw position the next new frame will take.
    pub fn next_seq_num(&self) -> u64 {
        self.next_seq_num
    }

    /// Number of frames awaiting acknowledgement.
    pub fn in_flight(&self) -> usize {
        (self.next_seq_num - self.base) as usize
    }

    /// `true` when another frame may be sent.
    pub fn has_space(&self) -> bool {
        self.next_seq_num < self.base + u64::from(self.size)
    }

    pub fn is_empty(&self) -> bool {
        self.outstanding.is_empty()
    }

    /// Wire sequence number for a raw position.
    fn wire_seq(&self, raw: u64) -> u32 {
        (raw % u64::from(self.modulo)) as u32
    }

    /// Assign the next sequence number to `payload` and record it as
    /// outstanding.  Returns the frame to transmit.
    ///
    /// Callers must check [`has_space`](Self::has_space) first.
    pub fn push(&mut self, payload: Vec<u8>, now: Instant) -> Frame {
        debug_assert!(
            self.has_space(),
            "push on a full window ({} / {})",
            self.in_flight(),
            self.size
        );
        let raw_seq = self.next_seq_num;
        let frame = Frame::data(self.wire_seq(raw_seq), payload);
        self.outstanding.push_back(OutstandingFrame {
            raw_seq,
            frame: frame.clone(),
            first_sent_at: now,
            last_sent_at: now,
        });
        self.next_seq_num += 1;
        frame
    }

    /// Raw position denoted by `ack_num`, if it falls inside the window.
    pub fn ack_position(&self, ack_num: u32) -> Option<u64> {
        if ack_num >= self.modulo {
            return None;
        }
        let modulo = u64::from(self.modulo);
        let offset = (u64::from(ack_num) + modulo - self.base % modulo) % modulo;
        (offset < self.next_seq_num - self.base).then(|| self.base + offset)
    }

    /// Process a cumulative ACK.
    ///
    /// Removes every outstanding frame up to and including the acknowledged
    /// position, advances `base` past it and returns the delivery delay of
    /// each removed frame (`now - first_sent_at`), oldest first.  Returns an
    /// empty vector, leaving the window untouched, for an ACK outside
    /// `[base, next_seq_num)`.
    pub fn on_ack(&mut self, ack_num: u32, now: Instant) -> Vec<Duration> {
        let Some(position) = self.ack_position(ack_num) else {
            return Vec::new();
        };

        let mut delays = Vec::with_capacity((position - self.base + 1) as usize);
        while let Some(front) = self.outstanding.front() {
            if front.raw_seq > position {
                break;
            }
            delays.push(now.saturating_duration_since(front.first_sent_at));
            self.outstanding.pop_front();
        }
        self.base = position + 1;
        delays
    }

    /// Stamp every outstanding frame as resent at `now` and return copies to
    /// put back on the channel (the "go back N" step).
    pub fn retransmit_all(&mut self, now: Instant) -> Vec<Frame> {
        self.outstanding
            .iter_mut()
            .map(|entry| {
                entry.last_sent_at = now;
                entry.frame.clone()
            })
            .collect()
    }

    /// Last transmission time of the oldest outstanding frame, or `None` when
    /// nothing is in flight.
    pub fn oldest_sent_at(&self) -> Option<Instant> {
        self.outstanding.front().map(|e| e.last_sent_at)
    }

    /// Iterate over outstanding frames from oldest to newest.
    pub fn outstanding(&self) -> impl Iterator<Item = &OutstandingFrame> {
        self.outstanding.iter()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn filled(size: u32, modulo: u32, count: usize) -> (SendWindow, Instant) {
        let now = Instant::now();
        let mut w = SendWindow::new(size, modulo);
        for i in 0..count {
            w.push(format!("p{i}").into_bytes(), now);
        }
        (w, now)
    }

    #[test]
    fn initial_state() {
        let w = SendWindow::new(3, 4);
        assert_eq!(w.base(), 0);
        assert_eq!(w.next_seq_num(), 0);
        assert!(w.has_space());
        assert!(w.is_empty());
        assert_eq!(w.oldest_sent_at(), None);
    }

    #[test]
    fn push_assigns_modulo_sequence() {
        let (mut w, now) = filled(3, 4, 3);
        assert!(!w.has_space());
        assert_eq!(w.in_flight(), 3);

        w.on_ack(2, now);
        let f = w.push(b"p3".to_vec(), now);
        assert_eq!(f, Frame::data(3, "p3"));
        let f = w.push(b"p4".to_vec(), now);
        assert_eq!(f, Frame::data(0, "p4"), "raw 4 wraps to 0 under MOD=4");
    }

    #[test]
    fn cumulative_ack_slides_multiple() {
        let (mut w, now) = filled(4, 8, 3);
        let later = now + Duration::from_millis(40);

        let delays = w.on_ack(1, later);
        assert_eq!(delays, vec![Duration::from_millis(40); 2]);
        assert_eq!(w.base(), 2);
        assert_eq!(w.in_flight(), 1);
    }

    #[test]
    fn duplicate_ack_is_noop() {
        let (mut w, now) = filled(4, 8, 2);
        assert_eq!(w.on_ack(0, now).len(), 1);

        assert!(w.on_ack(0, now).is_empty());
        assert_eq!(w.base(), 1);
        assert_eq!(w.in_flight(), 1);
    }

    #[test]
    fn ack_beyond_next_seq_ignored() {
        let (mut w, now) = filled(4, 8, 2);
        assert!(w.on_ack(5, now).is_empty());
        assert!(w.on_ack(2, now).is_empty());
        assert_eq!(w.base(), 0);
    }

    #[test]
    fn ack_outside_sequence_space_ignored() {
        let (mut w, now) = filled(3, 4, 3);
        assert!(w.on_ack(4, now).is_empty());
        assert!(w.on_ack(u32::MAX, now).is_empty());
        assert_eq!(w.in_flight(), 3);
    }

    #[test]
    fn initial_receiver_nack_is_rejected() {
        // Before anything is delivered the receiver re-acks MOD - 1.
        let (mut w, now) = filled(3, 4, 3);
        assert!(w.on_ack(3, now).is_empty());
        assert_eq!(w.base(), 0);
    }

    #[test]
    fn ack_across_wraparound() {
        let now = Instant::now();
        let mut w = SendWindow::new(3, 4);
        for i in 0..3 {
            w.push(vec![b'a' + i], now);
        }
        w.on_ack(2, now);
        // raw 3, 4, 5 → wire 3, 0, 1
        for i in 0..3 {
            w.push(vec![b'x' + i], now);
        }
        assert_eq!(w.ack_position(3), Some(3));
        assert_eq!(w.ack_position(0), Some(4));
        assert_eq!(w.ack_position(1), Some(5));
        assert_eq!(w.ack_position(2), None, "wire 2 is raw 2, already cleared");

        assert_eq!(w.on_ack(0, now).len(), 2);
        assert_eq!(w.base(), 5);
    }

    #[test]
    fn retransmit_refreshes_last_sent() {
        let (mut w, now) = filled(3, 4, 2);
        let later = now + Duration::from_secs(1);

        let frames = w.retransmit_all(later);
        assert_eq!(frames, vec![Frame::data(0, "p0"), Frame::data(1, "p1")]);
        assert_eq!(w.oldest_sent_at(), Some(later));
        assert!(w.outstanding().all(|e| e.first_sent_at == now));
    }

    #[test]
    fn randomized_acks_keep_invariants() {
        let mut rng = StdRng::seed_from_u64(0x9b4e);
        for _ in 0..200 {
            let size = rng.random_range(1..=8u32);
            let modulo = rng.random_range(size + 1..=size + 4);
            let mut w = SendWindow::new(size, modulo);
            let now = Instant::now();

            for step in 0..100 {
                if w.has_space() && rng.random_bool(0.6) {
                    w.push(format!("s{step}").into_bytes(), now);
                }
                let ack = rng.random_range(0..modulo + 2);
                let before = (w.base(), w.next_seq_num(), w.outstanding().count());
                let inside = w.ack_position(ack).is_some();
                let delays = w.on_ack(ack, now);

                if inside {
                    assert!(!delays.is_empty());
                    assert!(w.base() > before.0);
                } else {
                    assert!(delays.is_empty());
                    assert_eq!((w.base(), w.next_seq_num(), w.outstanding().count()), before);
                }
                assert!(w.next_seq_num() - w.base() <= u64::from(size));
                assert_eq!(w.in_flight(), w.outstanding().count());
            }
        }
    }
}
