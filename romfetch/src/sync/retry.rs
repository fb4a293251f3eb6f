use std::time::Duration;

use rand::Rng;

/// Bounded retry schedule for a single file transfer: exponential delays
/// capped at `max_delay`, optionally with full jitter.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    jitter: bool,
}

impl RetryPolicy {
    pub fn new(attempts: u32, base_delay: Duration, max_delay: Duration, jitter: bool) -> Self {
        Self {
            attempts: attempts.max(1),
            base_delay,
            max_delay,
            jitter,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Whether another attempt is allowed after `attempt` (1-based) failed.
    pub fn allows_retry_after(&self, attempt: u32) -> bool {
        attempt < self.attempts
    }

    pub fn delay_after(&self, attempt: u32) -> Duration {
        let mut rng = rand::thread_rng();
        self.delay_after_with_rng(attempt, &mut rng)
    }

    pub fn delay_after_with_rng<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let base_ms = u64::try_from(self.base_delay.as_millis()).unwrap_or(u64::MAX);
        let max_ms = u64::try_from(self.max_delay.as_millis()).unwrap_or(u64::MAX);
        let shift = attempt.saturating_sub(1).min(16);
        let capped = base_ms.saturating_mul(1u64 << shift).min(max_ms);
        if self.jitter {
            Duration::from_millis(rng.gen_range(0..=capped))
        } else {
            Duration::from_millis(capped)
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(500), Duration::from_secs(10), true)
    }
}
