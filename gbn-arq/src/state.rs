//! Sender finite-state machine types.
//!
//! The transitions themselves are driven by [`crate::sender::Sender`]; this
//! module only names the states so they can be logged and asserted on.

/// Lifecycle of one sender.
///
/// ```text
///  IDLE ──payload──▶ SENDING ──window full / queue empty──▶ WAITING
///                       ▲                                    │  │
///                       └──────────────ACK──────────────────┘  │ timeout
///                       ▲                                       ▼
///                       └──────────── resent ─────────── ON_TIMEOUT
///
///  any ── base == total_packets ──▶ DONE
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SenderState {
    /// Nothing sent yet.
    #[default]
    Idle,
    /// Window has room and a payload was available; frames are going out.
    Sending,
    /// Window full or source empty; waiting for ACKs or the timer.
    Waiting,
    /// Timer expired; the whole window is being resent.
    OnTimeout,
    /// Every packet acknowledged.
    Done,
}

impl std::fmt::Display for SenderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SenderState::Idle => "IDLE",
            SenderState::Sending => "SENDING",
            SenderState::Waiting => "WAITING",
            SenderState::OnTimeout => "ON_TIMEOUT",
            SenderState::Done => "DONE",
        };
        f.write_str(name)
    }
}
