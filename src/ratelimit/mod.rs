//! Rate limiting logic and state management.

mod backend;
mod clock;
mod counter;
mod decision;
mod key;
mod limiter;
mod policy;
mod sweeper;

pub use backend::AdmissionControl;
pub use clock::{Clock, ManualClock, SystemClock};
pub use counter::CounterRecord;
pub use decision::Decision;
pub use key::ClientKey;
pub use limiter::RateLimiter;
pub use policy::{RateLimitPolicy, DEFAULT_IDLE_TIMEOUT, DEFAULT_LIMIT, DEFAULT_WINDOW};
pub use sweeper::Sweeper;
