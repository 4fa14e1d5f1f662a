pub mod backoff;
pub mod health;
pub mod rate_limit;

pub use backoff::{Backoff, BackoffConfig};
pub use health::HealthStatus;
pub use rate_limit::{RateLimitConfig, RateLimitError, TokenBucket};
