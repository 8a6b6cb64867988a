use std::time::Duration;

/// Retry schedule for transient admin API failures.
///
/// Attempt `n` (1-based) that fails transiently is followed by a sleep of
/// `initial_delay * 2^(n-1)`, capped at `max_delay`, with ±50% jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first. `1` disables retries.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Zero delays. Used by tests that exercise retry counts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Un-jittered delay after the given failed attempt.
    pub fn base_delay(&self, failed_attempt: u32) -> Duration {
        let exponent = failed_attempt.saturating_sub(1).min(16);
        self.initial_delay
            .saturating_mul(2u32.pow(exponent))
            .min(self.max_delay)
    }

    /// Delay after the given failed attempt, jittered into
    /// `[base * 0.5, base * 1.5]`.
    pub fn delay_for(&self, failed_attempt: u32) -> Duration {
        let base = self.base_delay(failed_attempt).as_millis() as u64;
        if base == 0 {
            return Duration::ZERO;
        }

        use rand::Rng;
        let mut rng = rand::thread_rng();
        let jitter = base / 2;
        let min_delay = base.saturating_sub(jitter);
        let max_delay = base.saturating_add(jitter);
        let millis = if min_delay < max_delay {
            rng.gen_range(min_delay..=max_delay)
        } else {
            base
        };
        Duration::from_millis(millis)
    }
}
