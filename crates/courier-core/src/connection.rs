//! Per-connection timing and liveness.
//!
//! # Keepalive
//!
//! The writer probes the peer with a ping every `ping_period`; the reader
//! expects to hear *something* (data, ping or pong) within `pong_wait` of the
//! previous frame. The ping period is always shorter than the wait so a
//! healthy peer answers before its deadline.
//!
//! - **Pong wait**: 60 seconds without any frame closes the connection
//! - **Ping period**: 54 seconds (9/10 of the pong wait)
//! - **Write wait**: 10 seconds for any single write

use std::time::{Duration, Instant};

/// Connection configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// How long the reader waits for the next frame before giving up
    pub pong_wait: Duration,
    /// Interval between keepalive pings (must be < pong_wait)
    pub ping_period: Duration,
    /// Deadline for a single transport write
    pub write_wait: Duration,
    /// Largest inbound frame accepted, in bytes
    pub max_message_size: usize,
    /// Capacity of the outbound queue
    pub queue_capacity: usize,
}

impl ConnectionConfig {
    /// Build a config from a pong wait, deriving the ping period.
    pub fn with_pong_wait(pong_wait: Duration) -> Self {
        Self { pong_wait, ping_period: ping_period_for(pong_wait), ..Self::default() }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        let pong_wait = Duration::from_secs(60);
        Self {
            pong_wait,
            ping_period: ping_period_for(pong_wait),
            write_wait: Duration::from_secs(10),
            max_message_size: 2048,
            queue_capacity: 256,
        }
    }
}

/// Ping period for a given pong wait: 90% of it.
pub fn ping_period_for(pong_wait: Duration) -> Duration {
    pong_wait * 9 / 10
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LivenessState {
    Alive,
    Closed,
}

/// Read-side liveness tracker for one connection.
///
/// Pure state machine: the caller supplies every instant.
#[derive(Debug, Clone)]
pub struct Liveness {
    state: LivenessState,
    pong_wait: Duration,
    last_activity: Instant,
}

impl Liveness {
    /// Start tracking at `now`.
    pub fn new(now: Instant, pong_wait: Duration) -> Self {
        Self { state: LivenessState::Alive, pong_wait, last_activity: now }
    }

    /// Record a frame received at `now`, pushing the deadline out.
    ///
    /// Ignored once closed.
    pub fn record_activity(&mut self, now: Instant) {
        if self.state == LivenessState::Closed {
            return;
        }
        self.last_activity = self.last_activity.max(now);
    }

    /// Instant by which the next frame must arrive.
    #[must_use]
    pub fn deadline(&self) -> Instant {
        self.last_activity + self.pong_wait
    }

    /// Check whether the peer went silent.
    ///
    /// # Returns
    /// `Some(elapsed)` since the last frame if the window has passed; the
    /// tracker is then closed.
    pub fn check_timeout(&mut self, now: Instant) -> Option<Duration> {
        if self.state == LivenessState::Closed {
            return None;
        }
        let elapsed = now.saturating_duration_since(self.last_activity);
        if elapsed >= self.pong_wait {
            self.state = LivenessState::Closed;
            Some(elapsed)
        } else {
            None
        }
    }

    /// Transition to Closed state
    pub fn close(&mut self) {
        self.state = LivenessState::Closed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_timings() {
        let config = ConnectionConfig::default();
        assert_eq!(config.pong_wait, Duration::from_secs(60));
        assert_eq!(config.ping_period, Duration::from_secs(54));
        assert_eq!(config.write_wait, Duration::from_secs(10));
        assert_eq!(config.max_message_size, 2048);
        assert_eq!(config.queue_capacity, 256);
    }

    #[test]
    fn ping_period_tracks_pong_wait() {
        let config = ConnectionConfig::with_pong_wait(Duration::from_secs(10));
        assert_eq!(config.ping_period, Duration::from_secs(9));
        assert!(config.ping_period < config.pong_wait);
    }

    #[test]
    fn silent_peer_times_out() {
        let t0 = Instant::now();
        let mut liveness = Liveness::new(t0, Duration::from_secs(60));

        assert!(liveness.check_timeout(t0 + Duration::from_secs(59)).is_none());
        assert_eq!(liveness.state, LivenessState::Alive);

        let elapsed = liveness.check_timeout(t0 + Duration::from_secs(60));
        assert_eq!(elapsed, Some(Duration::from_secs(60)));
        assert_eq!(liveness.state, LivenessState::Closed);

        // Reported once
        assert!(liveness.check_timeout(t0 + Duration::from_secs(90)).is_none());
    }

    #[test]
    fn activity_pushes_deadline() {
        let t0 = Instant::now();
        let mut liveness = Liveness::new(t0, Duration::from_secs(60));

        let t1 = t0 + Duration::from_secs(50);
        liveness.record_activity(t1);
        assert_eq!(liveness.deadline(), t1 + Duration::from_secs(60));

        // 100s after start but only 50s after the last frame
        assert!(liveness.check_timeout(t0 + Duration::from_secs(100)).is_none());
    }

    #[test]
    fn out_of_order_instants_do_not_pull_deadline_back() {
        let t0 = Instant::now();
        let mut liveness = Liveness::new(t0, Duration::from_secs(60));

        liveness.record_activity(t0 + Duration::from_secs(30));
        liveness.record_activity(t0 + Duration::from_secs(10));
        assert_eq!(liveness.deadline(), t0 + Duration::from_secs(90));
    }

    #[test]
    fn closed_tracker_ignores_activity() {
        let t0 = Instant::now();
        let mut liveness = Liveness::new(t0, Duration::from_secs(60));
        liveness.close();

        liveness.record_activity(t0 + Duration::from_secs(1));
        assert_eq!(liveness.deadline(), t0 + Duration::from_secs(60));
        assert!(liveness.check_timeout(t0 + Duration::from_secs(120)).is_none());
    }
}
