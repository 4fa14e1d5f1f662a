use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RateLimitError {
    #[error("Token bucket capacity must be greater than 0")]
    ZeroCapacity,
    #[error("Refill rate must be a positive finite number, got {0}")]
    InvalidRefillRate(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Burst size in records.
    pub capacity: u32,
    /// Sustained records per second.
    pub refill_rate: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            refill_rate: 500.0,
        }
    }
}

impl RateLimitConfig {
    pub fn validate(&self) -> Result<(), RateLimitError> {
        if self.capacity == 0 {
            return Err(RateLimitError::ZeroCapacity);
        }
        if !self.refill_rate.is_finite() || self.refill_rate <= 0.0 {
            return Err(RateLimitError::InvalidRefillRate(self.refill_rate));
        }
        Ok(())
    }
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl BucketState {
    fn refill(&mut self, capacity: f64, rate: f64) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * rate).min(capacity);
        self.last_refill = now;
    }
}

/// Token bucket gate in front of the delivery loop.
///
/// Waiters are served in request order: the state lives behind Tokio's fair
/// mutex and a waiter keeps the lock while it sleeps for its token, so later
/// callers queue behind it. The bucket never drops anything; excess load
/// backs up into the event queue.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    refill_rate: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    pub fn new(config: RateLimitConfig) -> Result<Self, RateLimitError> {
        config.validate()?;
        let capacity = f64::from(config.capacity);
        Ok(Self {
            capacity,
            refill_rate: config.refill_rate,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        })
    }

    /// Take one token, suspending until one is available. Dropping the
    /// future before it completes consumes nothing.
    pub async fn acquire(&self) {
        let mut state = self.state.lock().await;
        state.refill(self.capacity, self.refill_rate);
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            return;
        }

        let deficit = 1.0 - state.tokens;
        // A vanishingly small rate can ask for more than a Duration holds.
        let wait =
            Duration::try_from_secs_f64(deficit / self.refill_rate).unwrap_or(Duration::MAX);
        tracing::trace!("Rate limit reached, waiting {:?} for a token", wait);
        tokio::time::sleep(wait).await;

        state.refill(self.capacity, self.refill_rate);
        state.tokens = (state.tokens - 1.0).max(0.0);
    }

    /// Take a token only if one is immediately available and nobody is
    /// already waiting.
    pub fn try_acquire(&self) -> bool {
        let Ok(mut state) = self.state.try_lock() else {
            return false;
        };
        state.refill(self.capacity, self.refill_rate);
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity as u32
    }

    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }
}
