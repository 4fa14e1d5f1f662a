use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Randomizes only the growth step between consecutive intervals,
    /// shrinking it by up to 20%. A jittered delay therefore lies between
    /// the previous interval and the current one, so the sequence never
    /// decreases and never exceeds `max_delay`. Once the ceiling is reached
    /// every delay equals `max_delay`.
    pub jitter: bool,
    /// A connection that stays up at least this long resets the backoff.
    pub stability_window: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            jitter: true,
            stability_window: Duration::from_secs(30),
        }
    }
}

/// Exponential backoff with optional jitter, capped at `max_delay`.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    attempt: u32,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self { config, attempt: 0 }
    }

    pub fn config(&self) -> &BackoffConfig {
        &self.config
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Un-jittered delay for a given attempt number (0-based).
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let base = self.config.base_delay.as_secs_f64();
        let max = self.config.max_delay.as_secs_f64();
        let exponent = attempt.min(1024) as i32;
        let secs = base * self.config.multiplier.powi(exponent);

        if secs.is_finite() && secs < max {
            Duration::from_secs_f64(secs)
        } else {
            self.config.max_delay
        }
    }

    /// The interval the next wait will be based on.
    pub fn current_interval(&self) -> Duration {
        self.calculate_delay(self.attempt)
    }

    /// Delay to wait now; advances the attempt counter.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current_interval();
        let previous = match self.attempt {
            0 => Duration::ZERO,
            n => self.calculate_delay(n - 1),
        };
        self.attempt = self.attempt.saturating_add(1);
        if self.config.jitter {
            self.apply_jitter(previous, delay)
        } else {
            delay
        }
    }

    fn apply_jitter(&self, previous: Duration, delay: Duration) -> Duration {
        let step = delay.saturating_sub(previous);
        let factor = rand::rng().random_range(0.8..=1.0);
        let step = Duration::try_from_secs_f64(step.as_secs_f64() * factor).unwrap_or(step);
        previous.saturating_add(step).min(delay)
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Called when a connection ends. Returns whether it was up long enough
    /// to reset the backoff to its base interval.
    pub fn record_connected_period(&mut self, connected_for: Duration) -> bool {
        if connected_for >= self.config.stability_window {
            self.reset();
            true
        } else {
            false
        }
    }
}
