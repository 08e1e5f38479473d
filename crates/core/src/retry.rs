//! Retry policy for transient task failures.
//!
//! Transient failures (timeouts, rate limits, unavailable service) are
//! re-attempted with exponential backoff; permanent failures are never
//! retried. The delay sequence is `base * 2^attempt`, clamped to
//! `max_delay`.

use std::time::Duration;

/// Tunable parameters for the exponential-backoff retry policy.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of re-attempts after the first failure.
    pub max_retries: u32,
    /// Delay before the first re-attempt.
    pub base_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// Backoff delay before re-attempt number `attempt` (0-based: the
    /// delay after the first failure is `delay_for_attempt(0)`).
    ///
    /// The result is clamped to [`RetryConfig::max_delay`].
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        // Cap the shift so a large attempt count cannot overflow.
        let factor = 1u64 << attempt.min(16);
        let delay_ms = (self.base_delay.as_millis() as u64).saturating_mul(factor);
        Duration::from_millis(delay_ms).min(self.max_delay)
    }
}
