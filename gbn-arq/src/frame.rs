//! Wire format for the two frame kinds exchanged between endpoints.
//!
//! Every datagram carries exactly one [`Frame`].  This module is responsible
//! for:
//! - Defining the tagged frame type (data or cumulative acknowledgement).
//! - Encoding a [`Frame`] into the datagram bytes.
//! - Strictly decoding raw bytes back into a [`Frame`], rejecting anything
//!   that does not match the grammar exactly.
//!
//! No I/O happens here — this is pure data transformation.
//!
//! # Wire format
//!
//! Frames are UTF-8 text:
//!
//! ```text
//!  data frame:   SEQ:<digits>,DATA:<payload>
//!  ack frame:    ACK:<digits>
//! ```
//!
//! `<digits>` is one or more ASCII decimal digits that fit a `u32` (no sign,
//! no whitespace).  `<payload>` is everything after the first `,DATA:` and
//! may itself contain commas or colons.

use thiserror::Error;

const SEQ_TAG: &str = "SEQ:";
const DATA_TAG: &str = ",DATA:";
const ACK_TAG: &str = "ACK:";

/// Largest encoded frame that fits one UDP datagram.
pub const MAX_FRAME_LEN: usize = 65_507;

/// One protocol unit.  Immutable once built; retransmissions re-encode the
/// same value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Frame {
    /// Payload carrying frame, `seq` already reduced modulo the sequence space.
    Data { seq: u32, payload: Vec<u8> },
    /// Cumulative acknowledgement: every frame up to and including `num`.
    Ack { num: u32 },
}

/// Errors raised while encoding or decoding a frame.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("datagram is empty")]
    Empty,
    #[error("datagram is not valid UTF-8")]
    NotUtf8,
    #[error("unrecognised frame tag")]
    UnknownTag,
    #[error("data frame has no DATA field")]
    MissingData,
    #[error("invalid sequence number {0:?}")]
    BadNumber(String),
    #[error("payload is not valid UTF-8 and cannot be carried as text")]
    PayloadNotUtf8,
    #[error("encoded frame is {0} bytes, larger than one datagram")]
    TooLarge(usize),
}

impl Frame {
    /// Build a data frame.
    pub fn data(seq: u32, payload: impl Into<Vec<u8>>) -> Self {
        Frame::Data {
            seq,
            payload: payload.into(),
        }
    }

    /// Build an acknowledgement frame.
    pub fn ack(num: u32) -> Self {
        Frame::Ack { num }
    }

    /// Serialise into a newly allocated datagram.
    ///
    /// Fails when the payload is not UTF-8 (the encoding is textual) or the
    /// result would not fit a single datagram.
    pub fn encode(&self) -> Result<Vec<u8>, FrameError> {
        let text = match self {
            Frame::Data { seq, payload } => {
                let payload =
                    std::str::from_utf8(payload).map_err(|_| FrameError::PayloadNotUtf8)?;
                format!("{SEQ_TAG}{seq}{DATA_TAG}{payload}")
            }
            Frame::Ack { num } => format!("{ACK_TAG}{num}"),
        };
        if text.len() > MAX_FRAME_LEN {
            return Err(FrameError::TooLarge(text.len()));
        }
        Ok(text.into_bytes())
    }

    /// Parse a frame from raw datagram bytes.
    ///
    /// Fails closed: any deviation from the grammar in the module docs is an
    /// error and nothing is partially accepted.
    pub fn decode(buf: &[u8]) -> Result<Self, FrameError> {
        if buf.is_empty() {
            return Err(FrameError::Empty);
        }
        let text = std::str::from_utf8(buf).map_err(|_| FrameError::NotUtf8)?;

        if let Some(rest) = text.strip_prefix(SEQ_TAG) {
            let (seq, payload) = rest.split_once(DATA_TAG).ok_or(FrameError::MissingData)?;
            return Ok(Frame::Data {
                seq: parse_number(seq)?,
                payload: payload.as_bytes().to_vec(),
            });
        }
        if let Some(num) = text.strip_prefix(ACK_TAG) {
            return Ok(Frame::Ack {
                num: parse_number(num)?,
            });
        }
        Err(FrameError::UnknownTag)
    }

    /// Sequence or acknowledgement number carried by the frame.
    pub fn number(&self) -> u32 {
        match self {
            Frame::Data { seq, .. } => *seq,
            Frame::Ack { num } => *num,
        }
    }
}

impl std::fmt::Display for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Frame::Data { seq, payload } => {
                write!(f, "DATA seq={seq} len={}", payload.len())
            }
            Frame::Ack { num } => write!(f, "ACK num={num}"),
        }
    }
}

/// `u32::from_str` accepts a leading `+`; the wire grammar does not.
fn parse_number(field: &str) -> Result<u32, FrameError> {
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
        return Err(FrameError::BadNumber(field.to_string()));
    }
    field
        .parse()
        .map_err(|_| FrameError::BadNumber(field.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_frame_wire_text() {
        let bytes = Frame::data(3, "Packet-7").encode().unwrap();
        assert_eq!(bytes, b"SEQ:3,DATA:Packet-7");
    }

    #[test]
    fn ack_frame_wire_text() {
        assert_eq!(Frame::ack(0).encode().unwrap(), b"ACK:0");
    }

    #[test]
    fn decode_data_frame() {
        let frame = Frame::decode(b"SEQ:12,DATA:hello").unwrap();
        assert_eq!(frame, Frame::data(12, "hello"));
    }

    #[test]
    fn payload_may_contain_separators() {
        let frame = Frame::decode(b"SEQ:1,DATA:a,DATA:b:c").unwrap();
        assert_eq!(frame, Frame::data(1, "a,DATA:b:c"));
    }

    #[test]
    fn empty_payload_is_allowed() {
        assert_eq!(Frame::decode(b"SEQ:0,DATA:").unwrap(), Frame::data(0, ""));
    }

    #[test]
    fn decode_rejects_empty_datagram() {
        assert_eq!(Frame::decode(b""), Err(FrameError::Empty));
    }

    #[test]
    fn decode_rejects_unknown_tag() {
        assert_eq!(Frame::decode(b"NAK:3"), Err(FrameError::UnknownTag));
        assert_eq!(Frame::decode(b"3:Packet_1"), Err(FrameError::UnknownTag));
    }

    #[test]
    fn decode_rejects_signed_or_padded_numbers() {
        let cases: [&[u8]; 6] = [b"ACK:+1", b"ACK: 1", b"ACK:-1", b"ACK:", b"ACK:1 ", b"SEQ:x,DATA:p"];
        for bad in cases {
            assert!(
                matches!(Frame::decode(bad), Err(FrameError::BadNumber(_))),
                "{:?} should be rejected",
                String::from_utf8_lossy(bad)
            );
        }
    }

    #[test]
    fn decode_rejects_overflowing_number() {
        assert!(matches!(
            Frame::decode(b"ACK:4294967296"),
            Err(FrameError::BadNumber(_))
        ));
    }

    #[test]
    fn decode_rejects_data_without_payload_field() {
        assert_eq!(Frame::decode(b"SEQ:4"), Err(FrameError::MissingData));
    }

    #[test]
    fn decode_rejects_invalid_utf8() {
        assert_eq!(Frame::decode(&[0xff, 0xfe]), Err(FrameError::NotUtf8));
    }

    #[test]
    fn encode_rejects_binary_payload() {
        let frame = Frame::data(0, vec![0xc3, 0x28]);
        assert_eq!(frame.encode(), Err(FrameError::PayloadNotUtf8));
    }

    #[test]
    fn encode_rejects_oversized_payload() {
        let frame = Frame::data(0, "x".repeat(MAX_FRAME_LEN));
        assert!(matches!(frame.encode(), Err(FrameError::TooLarge(_))));
    }
}
