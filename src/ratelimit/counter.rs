//! Per-key counter records.

use std::time::{Duration, Instant};

use super::decision::Decision;
use super::policy::RateLimitPolicy;

/// Requests counted for one client key in its current window.
///
/// A record is not synchronized on its own; the limiter holds the key's
/// lock for the whole of [`CounterRecord::observe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterRecord {
    /// Requests counted in the current window
    count: u64,
    /// When the current window started
    window_start: Instant,
}

impl CounterRecord {
    /// Create a fresh record whose window starts at `now`.
    pub fn new(now: Instant) -> Self {
        Self {
            count: 0,
            window_start: now,
        }
    }

    /// Get the current count.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Get the start of the current window.
    pub fn window_start(&self) -> Instant {
        self.window_start
    }

    /// Time since the window started. A `now` before `window_start`
    /// (clock skew) counts as zero.
    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.window_start)
    }

    /// Record a request at `now` and decide whether it is admitted.
    ///
    /// Rejections leave the count unchanged.
    pub fn observe(&mut self, now: Instant, policy: &RateLimitPolicy) -> Decision {
        self.maybe_reset_window(now, policy.window);

        if self.count >= policy.limit {
            return Decision::Reject {
                retry_after: policy.window.saturating_sub(self.elapsed(now)),
            };
        }

        self.count += 1;
        Decision::Admit {
            remaining: policy.limit - self.count,
        }
    }

    /// Whether the record is idle: its window has expired and no request
    /// started a new one for at least `idle_timeout`.
    pub fn is_stale(&self, now: Instant, window: Duration, idle_timeout: Duration) -> bool {
        let elapsed = self.elapsed(now);
        elapsed >= window && elapsed >= idle_timeout
    }

    fn maybe_reset_window(&mut self, now: Instant, window: Duration) {
        if self.elapsed(now) >= window {
            self.count = 0;
            self.window_start = now;
        }
    }
}
