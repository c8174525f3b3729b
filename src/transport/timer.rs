//! A cancellable one-shot deadline. The retransmit, hello, and ack timers
//! are all instances of this same shape, owned by the transport's sender
//! loop.

use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug)]
pub struct Timer {
    deadline: Option<Instant>,
}

impl Timer {
    pub fn idle() -> Timer {
        Timer { deadline: None }
    }

    pub fn arm(&mut self, after: Duration) {
        self.deadline = Some(Instant::now() + after);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn fired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Time left until this timer fires, or `None` if it's idle. Used to
    /// size the sender loop's poll interval instead of busy-spinning.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline.map(|d| d.saturating_duration_since(Instant::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_timer_never_fires() {
        let t = Timer::idle();
        assert!(!t.is_armed());
        assert!(!t.fired());
        assert!(t.remaining().is_none());
    }

    #[test]
    fn cancel_disarms() {
        let mut t = Timer::idle();
        t.arm(Duration::from_secs(60));
        assert!(t.is_armed());
        t.cancel();
        assert!(!t.is_armed());
    }
}
