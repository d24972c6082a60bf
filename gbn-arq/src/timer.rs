//! Retransmission timer.
//!
//! Go-Back-N keeps a single timer for the whole window: it expires when the
//! oldest outstanding frame has gone `timeout` without being (re)sent.
//! [`RetransmitTimer`] wraps one pinned `tokio::time::Sleep` that is re-armed
//! in place instead of allocating a new future per loop iteration.
//!
//! A disarmed timer is parked far in the future; callers must gate their
//! `select!` branch on [`RetransmitTimer::is_armed`].

use std::pin::Pin;
use std::time::Duration;

use tokio::time::{Instant, Sleep};

const PARKED: Duration = Duration::from_secs(365 * 24 * 3600);

/// Single-deadline timer for one sender.
#[derive(Debug)]
pub struct RetransmitTimer {
    sleep: Pin<Box<Sleep>>,
    deadline: Option<Instant>,
}

impl Default for RetransmitTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl RetransmitTimer {
    pub fn new() -> Self {
        Self {
            sleep: Box::pin(tokio::time::sleep(PARKED)),
            deadline: None,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Point the timer at `deadline`, or disarm it with `None`.
    ///
    /// Re-arming to the deadline it already holds is a no-op.
    pub fn set(&mut self, deadline: Option<Instant>) {
        if deadline == self.deadline {
            return;
        }
        self.deadline = deadline;
        let target = deadline.unwrap_or_else(|| Instant::now() + PARKED);
        self.sleep.as_mut().reset(target);
    }

    /// Resolve once the armed deadline is reached.
    pub async fn expired(&mut self) {
        self.sleep.as_mut().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn fires_at_deadline() {
        let mut timer = RetransmitTimer::new();
        let start = Instant::now();
        timer.set(Some(start + Duration::from_millis(500)));
        assert!(timer.is_armed());

        timer.expired().await;
        assert!(Instant::now() >= start + Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn rearm_moves_deadline() {
        let mut timer = RetransmitTimer::new();
        let start = Instant::now();
        timer.set(Some(start + Duration::from_millis(100)));
        timer.set(Some(start + Duration::from_millis(900)));

        timer.expired().await;
        assert!(Instant::now() >= start + Duration::from_millis(900));
    }

    #[tokio::test(start_paused = true)]
    async fn disarm_parks_timer() {
        let mut timer = RetransmitTimer::new();
        timer.set(Some(Instant::now() + Duration::from_millis(10)));
        timer.set(None);
        assert!(!timer.is_armed());

        let fired = tokio::time::timeout(Duration::from_secs(60), timer.expired()).await;
        assert!(fired.is_err());
    }
}
