//! Admission control trait for abstracting over limiter implementations.

use std::time::Instant;

use super::decision::Decision;
use crate::error::Result;

/// Trait for admission control backends.
///
/// The admission service is generic over this trait so it can be driven by
/// the in-memory [`RateLimiter`](super::RateLimiter) or any other
/// implementation that makes the same per-key decision.
pub trait AdmissionControl: Send + Sync {
    /// Decide whether a request from `key` arriving at `now` is admitted.
    fn check(&self, key: &str, now: Instant) -> Result<Decision>;

    /// The maximum number of requests admitted per window.
    fn limit(&self) -> u64;
}
