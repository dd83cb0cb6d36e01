//! Rate limiting logic and state management.

mod clock;
mod limiter;
mod record;
mod sweeper;

pub use clock::{Clock, ManualClock, SystemClock};
pub use limiter::{
    AdmissionDecision, LimiterConfig, RateLimitStatus, RateLimiter, DEFAULT_MAX_REQUESTS,
    DEFAULT_WINDOW, MAX_WINDOW,
};
pub use record::{format_timestamp, retry_after_secs, AdmissionRecord};
pub use sweeper::Sweeper;
