//! Failover backoff: optional delay between consecutive primary attempts.

use std::time::Duration;

/// Configuration for the delay inserted before each failover attempt.
///
/// The default is no delay: failing over to a different node is usually
/// worth doing immediately.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Delay before the first failover attempt.
    pub initial_backoff: Duration,
    /// Maximum delay (caps exponential growth).
    pub max_backoff: Duration,
    /// Multiplier applied to the delay on each further failover.
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

/// Stateless backoff policy: computes the delay given the retry number.
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    pub config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Returns the delay before the `retry`-th failover attempt (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        if retry == 0 || self.config.initial_backoff.is_zero() {
            return Duration::ZERO;
        }
        let base_ms = self.config.initial_backoff.as_millis() as f64
            * self.config.multiplier.powi((retry - 1) as i32);
        let cap_ms = self.config.max_backoff.as_millis() as f64;
        Duration::from_millis(base_ms.min(cap_ms) as u64)
    }
}
