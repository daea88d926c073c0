//! Admission service: turns limiter decisions into HTTP-shaped responses.

use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::error::TurnstileError;
use crate::ratelimit::{AdmissionControl, Clock, Decision};

/// Header carrying the configured per-window limit.
pub const HEADER_LIMIT: &str = "X-RateLimit-Limit";
/// Header carrying the requests left in the current window.
pub const HEADER_REMAINING: &str = "X-RateLimit-Remaining";
/// Header carrying the seconds until a rejected caller may retry.
pub const HEADER_RETRY_AFTER: &str = "Retry-After";

/// Status for an admitted request.
pub const STATUS_OK: u16 = 200;
/// Status for a request without a usable client key.
pub const STATUS_BAD_REQUEST: u16 = 400;
/// Status for a rejected request.
pub const STATUS_TOO_MANY_REQUESTS: u16 = 429;

/// What the HTTP layer should send back for one inbound request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdmissionResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers, in order
    pub headers: Vec<(String, String)>,
    /// JSON response body
    pub body: Value,
    /// The limiter decision, absent when the key was invalid
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<Decision>,
}

impl AdmissionResponse {
    /// Whether the caller should proceed with the request.
    pub fn is_admitted(&self) -> bool {
        self.decision.map(|d| d.is_admitted()).unwrap_or(false)
    }

    /// Look up a header value by name, ignoring ASCII case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn from_decision(decision: Decision, limit: u64) -> Self {
        let mut headers = vec![
            (HEADER_LIMIT.to_string(), limit.to_string()),
            (HEADER_REMAINING.to_string(), decision.remaining().to_string()),
        ];

        let (status, body) = match decision.retry_after_secs() {
            None => (STATUS_OK, json!({ "message": "Request allowed" })),
            Some(retry_after) => {
                headers.push((HEADER_RETRY_AFTER.to_string(), retry_after.to_string()));
                (
                    STATUS_TOO_MANY_REQUESTS,
                    json!({ "error": "Too many requests", "retry_after": retry_after }),
                )
            }
        };

        Self {
            status,
            headers,
            body,
            decision: Some(decision),
        }
    }

    fn missing_key() -> Self {
        Self {
            status: STATUS_BAD_REQUEST,
            headers: Vec::new(),
            body: json!({ "error": "Missing client key" }),
            decision: None,
        }
    }
}

/// The entry point an HTTP layer calls once per inbound request.
///
/// The caller resolves the client key (from a forwarded address, an API
/// credential, ...) and hands it in; the service never invents one.
pub struct AdmissionService<B: AdmissionControl, C: Clock> {
    /// The admission backend
    backend: Arc<B>,
    /// Time source for checks
    clock: C,
}

impl<B: AdmissionControl, C: Clock> AdmissionService<B, C> {
    /// Create a new AdmissionService with the given backend and clock.
    pub fn new(backend: Arc<B>, clock: C) -> Self {
        Self { backend, clock }
    }

    /// Get the backend.
    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Decide whether the request identified by `key` may proceed.
    #[instrument(skip(self))]
    pub fn admit(&self, key: Option<&str>) -> AdmissionResponse {
        let key = match key {
            Some(key) if !key.is_empty() => key,
            _ => {
                warn!("Received admission request without a client key");
                return AdmissionResponse::missing_key();
            }
        };

        match self.backend.check(key, self.clock.now()) {
            Ok(decision) => {
                debug!(decision = ?decision, "Admission decision made");
                AdmissionResponse::from_decision(decision, self.backend.limit())
            }
            Err(TurnstileError::InvalidKey) => {
                warn!("Backend rejected client key");
                AdmissionResponse::missing_key()
            }
            Err(e) => {
                // Fail closed
                warn!(error = %e, "Admission check failed");
                AdmissionResponse {
                    status: STATUS_TOO_MANY_REQUESTS,
                    headers: Vec::new(),
                    body: json!({ "error": "Too many requests" }),
                    decision: None,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::{ManualClock, RateLimitPolicy, RateLimiter};
    use std::time::Duration;

    fn service(limit: u64, window_secs: u64) -> (AdmissionService<RateLimiter, ManualClock>, ManualClock) {
        let policy = RateLimitPolicy::new(limit, Duration::from_secs(window_secs));
        let limiter = Arc::new(RateLimiter::new(policy).unwrap());
        let clock = ManualClock::new();
        (AdmissionService::new(limiter, clock.clone()), clock)
    }

    #[test]
    fn test_admitted_request() {
        let (service, _) = service(3, 60);

        let response = service.admit(Some("198.51.100.4"));

        assert!(response.is_admitted());
        assert_eq!(response.status, STATUS_OK);
        assert_eq!(response.header(HEADER_LIMIT), Some("3"));
        assert_eq!(response.header("x-ratelimit-remaining"), Some("2"));
        assert_eq!(response.header(HEADER_RETRY_AFTER), None);
        assert_eq!(response.body, json!({ "message": "Request allowed" }));
    }

    #[test]
    fn test_rejected_request() {
        let (service, clock) = service(1, 60);
        service.admit(Some("client"));
        clock.advance(Duration::from_secs(3));

        let response = service.admit(Some("client"));

        assert!(!response.is_admitted());
        assert_eq!(response.status, STATUS_TOO_MANY_REQUESTS);
        assert_eq!(response.header(HEADER_REMAINING), Some("0"));
        assert_eq!(response.header(HEADER_RETRY_AFTER), Some("57"));
        assert_eq!(
            response.body,
            json!({ "error": "Too many requests", "retry_after": 57 })
        );
    }

    #[test]
    fn test_missing_key_rejected() {
        let (service, _) = service(3, 60);

        for key in [None, Some("")] {
            let response = service.admit(key);
            assert_eq!(response.status, STATUS_BAD_REQUEST);
            assert!(response.decision.is_none());
            assert!(!response.is_admitted());
        }
        assert_eq!(service.backend().counter_count(), 0);
    }

    #[test]
    fn test_window_rollover_through_service() {
        let (service, clock) = service(1, 60);
        assert!(service.admit(Some("client")).is_admitted());
        assert!(!service.admit(Some("client")).is_admitted());

        clock.advance(Duration::from_secs(60));

        let response = service.admit(Some("client"));
        assert!(response.is_admitted());
        assert_eq!(response.header(HEADER_REMAINING), Some("0"));
    }

    #[test]
    fn test_response_serialization() {
        let (service, _) = service(2, 60);
        let value = serde_json::to_value(service.admit(Some("client"))).unwrap();

        assert_eq!(value["status"], 200);
        assert_eq!(value["headers"][0], json!(["X-RateLimit-Limit", "2"]));
        assert_eq!(value["decision"], json!({"outcome": "admit", "remaining": 1}));

        let value = serde_json::to_value(service.admit(None)).unwrap();
        assert!(value.get("decision").is_none());
    }
}
