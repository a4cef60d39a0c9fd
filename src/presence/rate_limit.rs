//! Rate limiting for outgoing playing updates.

use std::time::{Duration, Instant};

/// Minimum gap between successive playing publishes.
pub const MIN_PLAYING_GAP: Duration = Duration::from_secs(10);

/// Gates playing updates to a minimum interval.
///
/// Only playing transitions go through the limiter; stops, pauses and
/// loading states always propagate immediately. Updates inside the
/// window are dropped outright, not queued. The limiter is blind to
/// payload content, so an accepted update resets the window even for an
/// unchanged track.
#[derive(Debug)]
pub struct RateLimiter {
    min_gap: Duration,
    last_sent: Option<Instant>,
}

impl RateLimiter {
    pub fn new(min_gap: Duration) -> Self {
        Self {
            min_gap,
            last_sent: None,
        }
    }

    /// Returns true when the update is accepted; accepting resets the
    /// window.
    pub fn allow(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last_sent {
            if now.duration_since(last) < self.min_gap {
                return false;
            }
        }
        self.last_sent = Some(now);
        true
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(MIN_PLAYING_GAP)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_update_allowed() {
        let mut limiter = RateLimiter::default();
        assert!(limiter.allow(Instant::now()));
    }

    #[test]
    fn test_update_inside_window_dropped() {
        let mut limiter = RateLimiter::default();
        let t0 = Instant::now();
        assert!(limiter.allow(t0));
        assert!(!limiter.allow(t0 + Duration::from_secs(3)));
        assert!(!limiter.allow(t0 + Duration::from_secs(9)));
    }

    #[test]
    fn test_update_at_boundary_accepted_and_resets_window() {
        let mut limiter = RateLimiter::default();
        let t0 = Instant::now();
        assert!(limiter.allow(t0));
        assert!(limiter.allow(t0 + Duration::from_secs(10)));
        // window restarts from the accepted update
        assert!(!limiter.allow(t0 + Duration::from_secs(15)));
        assert!(limiter.allow(t0 + Duration::from_secs(20)));
    }
}
