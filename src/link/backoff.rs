//! Reconnect backoff policy.
//!
//! Delays follow `min(initial · 2^attempt, max)` with no jitter: the exact
//! sequence (1s, 2s, 4s, … capped at 30s by default) is part of the
//! transport contract and observable to operators.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Delay before the first reconnect attempt
    pub initial_delay: Duration,
    /// Cap applied to the exponential curve
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl BackoffPolicy {
    /// Delay before reconnect attempt `attempt` (0-indexed).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let multiplier = 2u64.saturating_pow(attempt);
        let millis = (self.initial_delay.as_millis() as u64)
            .saturating_mul(multiplier)
            .min(self.max_delay.as_millis() as u64);
        Duration::from_millis(millis)
    }
}
