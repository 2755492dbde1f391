// Bounded exponential backoff, shared by both catalog adapters.
//
// Rate limits and timeouts are retried with increasing delay; anything
// the caller classifies as non-retryable fails immediately. Exhausting
// the attempt budget surfaces the last error so the caller can skip the
// single item and keep scanning.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after a failed attempt (0-based). When the
    /// server supplied a Retry-After hint, wait at least that long.
    pub fn delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay);
        match retry_after {
            Some(hint) => exp.max(hint).min(self.max_delay),
            None => exp,
        }
    }

    /// True when another attempt is allowed after `attempt` failures.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt + 1 < self.max_attempts
    }
}
