//! Admission decisions.

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::time::Duration;

/// The outcome of a rate limit check.
///
/// Over-limit is an expected outcome, so it is represented here rather
/// than as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The request is admitted; `remaining` requests are left in the window.
    Admit { remaining: u64 },
    /// The request is rejected until the window rolls over.
    Reject { retry_after: Duration },
}

impl Decision {
    /// Whether the request was admitted.
    pub fn is_admitted(&self) -> bool {
        matches!(self, Decision::Admit { .. })
    }

    /// Requests left in the current window (zero when rejected).
    pub fn remaining(&self) -> u64 {
        match self {
            Decision::Admit { remaining } => *remaining,
            Decision::Reject { .. } => 0,
        }
    }

    /// Time until the caller may retry, if rejected.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Decision::Admit { .. } => None,
            Decision::Reject { retry_after } => Some(*retry_after),
        }
    }

    /// `retry_after` in whole seconds, rounded up, as used for `Retry-After`.
    pub fn retry_after_secs(&self) -> Option<u64> {
        self.retry_after().map(ceil_secs)
    }
}

fn ceil_secs(duration: Duration) -> u64 {
    if duration.subsec_nanos() > 0 {
        duration.as_secs() + 1
    } else {
        duration.as_secs()
    }
}

impl Serialize for Decision {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Decision", 2)?;
        match self {
            Decision::Admit { remaining } => {
                state.serialize_field("outcome", "admit")?;
                state.serialize_field("remaining", remaining)?;
            }
            Decision::Reject { retry_after } => {
                state.serialize_field("outcome", "reject")?;
                state.serialize_field("retry_after", &ceil_secs(*retry_after))?;
            }
        }
        state.end()
    }
}
