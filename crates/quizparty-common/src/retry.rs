use std::time::Duration;

/// Capped exponential backoff, usable by any probing client.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: u32,
    pub cap: Duration,
}

impl Default for RetryPolicy {
    /// 1s -> 2s -> 4s -> 8s -> 15s (capped), six attempts.
    fn default() -> Self {
        Self {
            max_attempts: 6,
            base_delay: Duration::from_millis(1000),
            multiplier: 2,
            cap: Duration::from_millis(15_000),
        }
    }
}

impl RetryPolicy {
    /// Delay to sleep after the given zero-based failed attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = u64::from(self.multiplier).saturating_pow(attempt);
        let ms = (self.base_delay.as_millis() as u64).saturating_mul(factor);
        Duration::from_millis(ms).min(self.cap)
    }

    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.max_attempts).map(|a| self.delay_for(a))
    }
}
