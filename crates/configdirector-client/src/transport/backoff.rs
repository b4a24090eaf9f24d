use std::time::Duration;

/// Lowest base delay a server `retry` hint may set.
pub const MIN_RETRY_BASE: Duration = Duration::from_secs(1);

/// Reconnect policy of the streaming transport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffConfig {
    /// Delay before the first retry.
    pub base: Duration,
    /// Upper bound of any delay, jitter excluded.
    pub max_backoff: Duration,
    /// Exponential factor applied per consecutive failure.
    pub factor: f64,
    /// Fraction of the delay randomly added or removed (`0.2` = ±20 %).
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            factor: 2.0,
            jitter: 0.2,
        }
    }
}

/// Consecutive-failure counter producing capped exponential delays.
#[derive(Debug)]
pub struct BackoffState {
    config: BackoffConfig,
    error_count: u32,
}

impl BackoffState {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            error_count: 0,
        }
    }

    /// Replaces the base delay with a server-provided `retry` hint, never
    /// going below [`MIN_RETRY_BASE`].
    pub fn set_base(&mut self, base: Duration) {
        self.config.base = base.max(MIN_RETRY_BASE);
    }

    /// Registers a failure and returns the delay before the next attempt.
    pub fn register_error(&mut self) -> Duration {
        self.error_count = self.error_count.saturating_add(1);
        let exponent = self.error_count.saturating_sub(1).min(32) as i32;
        let backoff = self.config.base.as_secs_f64() * self.config.factor.powi(exponent);
        let capped = backoff.min(self.config.max_backoff.as_secs_f64());
        let spread = capped * self.config.jitter;
        let jittered = capped + spread * (fastrand::f64() * 2.0 - 1.0);
        Duration::from_secs_f64(jittered.max(0.0))
    }

    /// Forgets past failures once a connection succeeded.
    pub fn reset(&mut self) {
        self.error_count = 0;
    }

    pub fn error_count(&self) -> u32 {
        self.error_count
    }
}
