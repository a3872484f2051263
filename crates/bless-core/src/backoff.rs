// ABOUTME: Exponential backoff schedule for lock contention.
// ABOUTME: delay = initial * multiplier^attempt, capped at max_interval.

use std::time::Duration;

/// Retry schedule used while waiting on the cache lock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    pub initial_interval: Duration,
    pub multiplier: f64,
    pub max_interval: Duration,
    /// Total time to keep retrying before giving up.
    pub max_elapsed: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(10),
            multiplier: 2.0,
            max_interval: Duration::from_millis(100),
            max_elapsed: Duration::from_secs(20),
        }
    }
}

impl Backoff {
    /// Delay before retry number `attempt` (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let initial_ms = self.initial_interval.as_millis() as f64;
        let delay_ms = initial_ms * self.multiplier.powi(attempt.min(32) as i32);
        let capped_ms = delay_ms.min(self.max_interval.as_millis() as f64);
        Duration::from_millis(capped_ms as u64)
    }
}
