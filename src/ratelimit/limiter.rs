//! Core rate limiter implementation.

use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

use super::backend::AdmissionControl;
use super::counter::CounterRecord;
use super::decision::Decision;
use super::key::ClientKey;
use super::policy::RateLimitPolicy;
use crate::error::{Result, TurnstileError};

/// The core rate limiter that manages per-key counter records.
///
/// Records live in a sharded map. A check holds only the shard lock of its
/// own key for the read-modify-write, so checks for unrelated keys do not
/// serialize on each other.
pub struct RateLimiter {
    /// Counter records indexed by client key
    counters: DashMap<ClientKey, CounterRecord>,
    /// The enforced policy
    policy: RateLimitPolicy,
}

impl RateLimiter {
    /// Create a new rate limiter enforcing `policy`.
    ///
    /// Fails with [`TurnstileError::InvalidConfiguration`] if the policy
    /// has a zero limit, window or idle timeout.
    pub fn new(policy: RateLimitPolicy) -> Result<Self> {
        policy.validate()?;

        if policy.idle_timeout_below_window() {
            warn!(
                idle_timeout = ?policy.idle_timeout,
                window = ?policy.window,
                "Idle timeout is shorter than the window; records are kept until their window expires"
            );
        }

        debug!(
            limit = policy.limit,
            window = ?policy.window,
            idle_timeout = ?policy.idle_timeout,
            "Creating rate limiter"
        );

        Ok(Self {
            counters: DashMap::new(),
            policy,
        })
    }

    /// Check the rate limit for `key` at `now`.
    ///
    /// The lookup, window reset and increment happen as one atomic step
    /// for the key. An empty key returns [`TurnstileError::InvalidKey`]
    /// and leaves every record untouched.
    pub fn check(&self, key: &str, now: Instant) -> Result<Decision> {
        if key.is_empty() {
            warn!("Rate limit check with empty client key");
            return Err(TurnstileError::InvalidKey);
        }

        trace!(key = %key, "Checking rate limit");

        let decision = match self.counters.get_mut(key) {
            Some(mut record) => record.observe(now, &self.policy),
            None => {
                let client_key = ClientKey::new(key)?;
                let mut record = self.counters.entry(client_key).or_insert_with(|| {
                    debug!(key = %key, "Creating new counter record");
                    CounterRecord::new(now)
                });
                record.observe(now, &self.policy)
            }
        };

        if let Decision::Reject { retry_after } = decision {
            debug!(
                key = %key,
                retry_after = ?retry_after,
                "Rate limit exceeded"
            );
        }

        Ok(decision)
    }

    /// Remove records that are genuinely idle.
    ///
    /// A record is removed only if its window has expired and it has been
    /// idle for at least `idle_timeout`. Candidates are collected first and
    /// each is then removed under its own lock after re-checking, so a
    /// record refreshed by a concurrent [`check`](Self::check) survives.
    ///
    /// Returns the number of records removed.
    pub fn evict_stale(&self, now: Instant, idle_timeout: Duration) -> usize {
        let window = self.policy.window;

        let candidates: Vec<ClientKey> = self
            .counters
            .iter()
            .filter(|entry| entry.value().is_stale(now, window, idle_timeout))
            .map(|entry| entry.key().clone())
            .collect();

        let mut evicted = 0;
        for key in candidates {
            let removed = self
                .counters
                .remove_if(&key, |_, record| record.is_stale(now, window, idle_timeout));
            if removed.is_some() {
                evicted += 1;
            }
        }

        if evicted > 0 {
            debug!(
                evicted = evicted,
                remaining = self.counters.len(),
                "Evicted idle counter records"
            );
        }

        evicted
    }

    /// Remove idle records using the policy's idle timeout.
    pub fn evict_expired(&self, now: Instant) -> usize {
        self.evict_stale(now, self.policy.idle_timeout)
    }

    /// Get the enforced policy.
    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    /// Get the stored count for a key.
    ///
    /// Returns `None` if no record exists. The value is the raw count and
    /// does not account for a window that has expired since the last check.
    pub fn get_count(&self, key: &str) -> Option<u64> {
        self.counters.get(key).map(|record| record.count())
    }

    /// Clear all records.
    pub fn clear(&self) {
        self.counters.clear();
    }

    /// Get the number of live records.
    pub fn counter_count(&self) -> usize {
        self.counters.len()
    }
}

impl AdmissionControl for RateLimiter {
    fn check(&self, key: &str, now: Instant) -> Result<Decision> {
        RateLimiter::check(self, key, now)
    }

    fn limit(&self) -> u64 {
        self.policy.limit
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("policy", &self.policy)
            .field("counters", &self.counters.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    fn limiter(limit: u64, window_secs: u64) -> RateLimiter {
        RateLimiter::new(RateLimitPolicy::new(limit, secs(window_secs))).unwrap()
    }

    #[test]
    fn test_rate_limiter_creation() {
        let limiter = limiter(10, 60);
        assert_eq!(limiter.counter_count(), 0);
        assert_eq!(limiter.policy().limit, 10);
    }

    #[test]
    fn test_invalid_configuration() {
        let result = RateLimiter::new(RateLimitPolicy::new(0, secs(60)));
        assert!(matches!(result, Err(TurnstileError::InvalidConfiguration(_))));

        let result = RateLimiter::new(RateLimitPolicy::new(5, Duration::ZERO));
        assert!(matches!(result, Err(TurnstileError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_check_creates_counter() {
        let limiter = limiter(10, 60);

        let decision = limiter.check("client", Instant::now()).unwrap();

        assert_eq!(decision, Decision::Admit { remaining: 9 });
        assert_eq!(limiter.counter_count(), 1);
        assert_eq!(limiter.get_count("client"), Some(1));
    }

    #[test]
    fn test_monotonic_counting() {
        let limiter = limiter(5, 60);
        let now = Instant::now();

        for expected in (0..5).rev() {
            let decision = limiter.check("client", now).unwrap();
            assert_eq!(decision, Decision::Admit { remaining: expected });
        }

        let decision = limiter.check("client", now).unwrap();
        assert!(!decision.is_admitted());
        assert_eq!(limiter.get_count("client"), Some(5));
    }

    #[test]
    fn test_window_rollover() {
        let limiter = limiter(2, 10);
        let start = Instant::now();

        limiter.check("client", start).unwrap();
        limiter.check("client", start).unwrap();
        assert!(!limiter.check("client", start + secs(5)).unwrap().is_admitted());

        let decision = limiter.check("client", start + secs(10)).unwrap();
        assert_eq!(decision, Decision::Admit { remaining: 1 });
    }

    #[test]
    fn test_scenario_limit_three_per_minute() {
        let limiter = limiter(3, 60);
        let t0 = Instant::now();

        assert_eq!(limiter.check("X", t0).unwrap(), Decision::Admit { remaining: 2 });
        assert_eq!(limiter.check("X", t0 + secs(1)).unwrap(), Decision::Admit { remaining: 1 });
        assert_eq!(limiter.check("X", t0 + secs(2)).unwrap(), Decision::Admit { remaining: 0 });
        assert_eq!(
            limiter.check("X", t0 + secs(3)).unwrap(),
            Decision::Reject { retry_after: secs(57) }
        );
        assert_eq!(limiter.check("X", t0 + secs(61)).unwrap(), Decision::Admit { remaining: 2 });
    }

    #[test]
    fn test_keys_are_isolated() {
        let limiter = limiter(1, 60);
        let now = Instant::now();

        assert!(limiter.check("a", now).unwrap().is_admitted());
        assert!(!limiter.check("a", now).unwrap().is_admitted());

        assert_eq!(limiter.check("b", now).unwrap(), Decision::Admit { remaining: 0 });
        assert_eq!(limiter.get_count("a"), Some(1));
        assert_eq!(limiter.get_count("b"), Some(1));
    }

    #[test]
    fn test_empty_key_leaves_state_unchanged() {
        let limiter = limiter(3, 60);
        let now = Instant::now();
        limiter.check("a", now).unwrap();
        limiter.check("b", now).unwrap();
        limiter.check("b", now).unwrap();

        let result = limiter.check("", now);

        assert!(matches!(result, Err(TurnstileError::InvalidKey)));
        assert_eq!(limiter.counter_count(), 2);
        assert_eq!(limiter.get_count("a"), Some(1));
        assert_eq!(limiter.get_count("b"), Some(2));
        assert_eq!(limiter.get_count(""), None);
    }

    #[test]
    fn test_evict_stale_removes_idle_records() {
        let limiter = limiter(3, 10);
        let start = Instant::now();
        limiter.check("idle", start).unwrap();
        limiter.check("busy", start + secs(100)).unwrap();

        let evicted = limiter.evict_stale(start + secs(105), secs(60));

        assert_eq!(evicted, 1);
        assert_eq!(limiter.get_count("idle"), None);
        assert_eq!(limiter.get_count("busy"), Some(1));
    }

    #[test]
    fn test_evict_stale_keeps_records_mid_window() {
        // Idle timeout shorter than the window: nothing may be evicted
        // until the window itself has expired.
        let limiter = limiter(3, 60);
        let start = Instant::now();
        limiter.check("client", start).unwrap();

        assert_eq!(limiter.evict_stale(start + secs(30), secs(5)), 0);
        assert_eq!(limiter.get_count("client"), Some(1));

        assert_eq!(limiter.evict_stale(start + secs(60), secs(5)), 1);
        assert_eq!(limiter.counter_count(), 0);
    }

    #[test]
    fn test_evicted_key_behaves_as_fresh() {
        let limiter = limiter(2, 10);
        let start = Instant::now();
        limiter.check("client", start).unwrap();
        limiter.check("client", start).unwrap();

        limiter.evict_stale(start + secs(20), secs(15));

        let decision = limiter.check("client", start + secs(20)).unwrap();
        assert_eq!(decision, Decision::Admit { remaining: 1 });
    }

    #[test]
    fn test_evict_expired_uses_policy_idle_timeout() {
        let policy = RateLimitPolicy::new(3, secs(10)).with_idle_timeout(secs(30));
        let limiter = RateLimiter::new(policy).unwrap();
        let start = Instant::now();
        limiter.check("client", start).unwrap();

        assert_eq!(limiter.evict_expired(start + secs(29)), 0);
        assert_eq!(limiter.evict_expired(start + secs(30)), 1);
    }

    #[test]
    fn test_clear_counters() {
        let limiter = limiter(3, 60);
        limiter.check("client", Instant::now()).unwrap();
        assert_eq!(limiter.counter_count(), 1);

        limiter.clear();
        assert_eq!(limiter.counter_count(), 0);
    }

    #[test]
    fn test_admission_control_impl() {
        let limiter = limiter(4, 60);
        let backend: &dyn AdmissionControl = &limiter;

        assert_eq!(backend.limit(), 4);
        assert_eq!(
            backend.check("client", Instant::now()).unwrap(),
            Decision::Admit { remaining: 3 }
        );
    }
}
