//! Rate limit policy.

use std::time::Duration;

use crate::error::{Result, TurnstileError};

/// Default number of requests allowed per window.
pub const DEFAULT_LIMIT: u64 = 100;
/// Default window duration.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);
/// Default idle period after which a record may be evicted.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// The limits a [`RateLimiter`](super::RateLimiter) enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    /// Maximum requests admitted per window
    pub limit: u64,
    /// Length of a window
    pub window: Duration,
    /// Idle period before a record becomes eligible for eviction
    pub idle_timeout: Duration,
}

impl RateLimitPolicy {
    /// Create a policy with the default idle timeout.
    pub fn new(limit: u64, window: Duration) -> Self {
        Self {
            limit,
            window,
            idle_timeout: DEFAULT_IDLE_TIMEOUT.max(window),
        }
    }

    /// Set the idle timeout used by eviction.
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Check that the policy can be enforced.
    pub fn validate(&self) -> Result<()> {
        if self.limit == 0 {
            return Err(TurnstileError::InvalidConfiguration(
                "limit must be greater than zero".to_string(),
            ));
        }
        if self.window.is_zero() {
            return Err(TurnstileError::InvalidConfiguration(
                "window duration must be greater than zero".to_string(),
            ));
        }
        if self.idle_timeout.is_zero() {
            return Err(TurnstileError::InvalidConfiguration(
                "idle timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether the idle timeout is shorter than the window. Such a policy
    /// is valid; eviction then waits for the window to expire instead.
    pub fn idle_timeout_below_window(&self) -> bool {
        self.idle_timeout < self.window
    }
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            window: DEFAULT_WINDOW,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}
