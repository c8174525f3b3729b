//! Slow-start / congestion-avoidance state for the reliable transport.

/// `cwnd` stays within `[1, window_cap]` and `in_flight` never exceeds
/// `cwnd`: every mutator here preserves both.
#[derive(Clone, Copy, Debug)]
pub struct Congestion {
    pub cwnd: u32,
    pub ssthresh: u32,
    pub in_flight: u32,
    acked_this_window: u32,
    window_cap: u32,
}

impl Congestion {
    pub fn new(window_cap: u32) -> Congestion {
        let window_cap = window_cap.max(1);
        Congestion {
            cwnd: 1,
            ssthresh: window_cap,
            in_flight: 0,
            acked_this_window: 0,
            window_cap,
        }
    }

    pub fn can_send(&self) -> bool {
        self.in_flight < self.cwnd
    }

    pub fn on_send(&mut self) {
        self.in_flight += 1;
    }

    /// A message left the ack queue acknowledged.
    pub fn on_ack(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
        if self.cwnd < self.ssthresh {
            self.cwnd = (self.cwnd + 1).min(self.window_cap);
            return;
        }
        self.acked_this_window += 1;
        if self.acked_this_window >= self.cwnd {
            self.acked_this_window = 0;
            self.cwnd = (self.cwnd + 1).min(self.window_cap);
        }
    }

    /// A retransmit timer fired.
    pub fn on_retransmit(&mut self) {
        self.ssthresh = (self.cwnd / 2).max(1);
        self.cwnd = 1;
        self.acked_this_window = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_in_slow_start() {
        let c = Congestion::new(4);
        assert_eq!(c.cwnd, 1);
        assert_eq!(c.ssthresh, 4);
        assert!(c.can_send());
    }

    #[test]
    fn in_flight_gates_sending() {
        let mut c = Congestion::new(4);
        c.on_send();
        assert!(!c.can_send());
    }

    #[test]
    fn retransmit_halves_ssthresh_and_resets_cwnd() {
        let mut c = Congestion::new(8);
        c.cwnd = 6;
        c.on_retransmit();
        assert_eq!(c.ssthresh, 3);
        assert_eq!(c.cwnd, 1);
    }

    #[test]
    fn cwnd_never_exceeds_window_cap() {
        let mut c = Congestion::new(2);
        for _ in 0..10 {
            c.on_ack();
        }
        assert!(c.cwnd <= 2);
    }
}
