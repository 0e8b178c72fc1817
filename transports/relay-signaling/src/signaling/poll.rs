//! Poll cadence with single-flight discipline
//!
//! Time is injected through [`PollScheduler::tick`] so the processing context
//! decides what "elapsed" means.

/// Timer and in-flight state for relay polls
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollState {
    /// Interval between polls in milliseconds
    pub interval_ms: f64,
    /// Time accumulated since the last poll was issued
    pub elapsed_ms: f64,
    /// A receive is outstanding
    pub in_flight: bool,
}

/// Decides when the relay should be polled
#[derive(Debug, Clone)]
pub struct PollScheduler {
    state: PollState,
    enabled: bool,
}

impl PollScheduler {
    /// Create a scheduler; when `enabled` is false only [`poll_now`](Self::poll_now) issues polls
    pub fn new(interval_ms: f64, enabled: bool) -> Self {
        Self {
            state: PollState {
                interval_ms,
                elapsed_ms: 0.0,
                in_flight: false,
            },
            enabled,
        }
    }

    /// Advance time; returns true when a poll should be issued now
    ///
    /// A true return resets the elapsed time and marks the poll in flight.
    /// While a poll is in flight time still accumulates, so the next poll
    /// follows as soon as the outstanding one completes.
    pub fn tick(&mut self, delta_ms: f64) -> bool {
        if !self.enabled {
            return false;
        }
        if delta_ms.is_finite() && delta_ms > 0.0 {
            self.state.elapsed_ms += delta_ms;
        }
        if self.state.in_flight || self.state.elapsed_ms < self.state.interval_ms {
            return false;
        }
        self.begin();
        true
    }

    /// Request an explicit poll, still subject to single-flight
    pub fn poll_now(&mut self) -> bool {
        if self.state.in_flight {
            return false;
        }
        self.begin();
        true
    }

    /// Mark the outstanding poll finished, whatever its outcome
    pub fn complete(&mut self) {
        self.state.in_flight = false;
    }

    /// Whether a receive is outstanding
    pub fn in_flight(&self) -> bool {
        self.state.in_flight
    }

    /// Whether timer-driven polling is on
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Switch timer-driven polling on or off
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Snapshot of the current state
    pub fn state(&self) -> PollState {
        self.state
    }

    fn begin(&mut self) {
        self.state.elapsed_ms = 0.0;
        self.state.in_flight = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_triggers_once() {
        let mut poll = PollScheduler::new(500.0, true);
        assert!(!poll.tick(499.0));
        assert!(poll.tick(1.0));
        assert!(poll.in_flight());
        assert_eq!(poll.state().elapsed_ms, 0.0);
    }

    #[test]
    fn test_no_poll_while_in_flight() {
        let mut poll = PollScheduler::new(500.0, true);
        assert!(poll.tick(500.0));
        for _ in 0..10 {
            assert!(!poll.tick(1000.0));
        }
        assert!(!poll.poll_now());

        poll.complete();
        assert!(poll.tick(0.0));
    }

    #[test]
    fn test_manual_mode() {
        let mut poll = PollScheduler::new(500.0, false);
        assert!(!poll.tick(10_000.0));
        assert!(poll.poll_now());
        assert!(!poll.poll_now());
        poll.complete();
        assert!(poll.poll_now());
    }

    #[test]
    fn test_ignores_bad_deltas() {
        let mut poll = PollScheduler::new(500.0, true);
        assert!(!poll.tick(f64::NAN));
        assert!(!poll.tick(-1000.0));
        assert_eq!(poll.state().elapsed_ms, 0.0);
    }
}
