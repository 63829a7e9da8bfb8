//! Bounded retry budgets for the readiness poller

use std::time::Duration;

/// Attempt-counted retry budget. Terminal-state decisions depend only on the
/// attempt count, so total elapsed time stays `attempts x interval` when the
/// backoff multiplier is 1.0.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts before giving up
    pub max_attempts: u32,

    /// Base delay between attempts
    pub interval: Duration,

    /// Multiplier applied to the delay per attempt; 1.0 keeps it fixed
    pub backoff: f64,

    /// Upper bound on a single delay
    pub max_interval: Duration,
}

impl RetryPolicy {
    /// Fixed-interval policy
    pub fn fixed(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
            backoff: 1.0,
            max_interval: interval,
        }
    }

    /// Delay before the given attempt (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let delay_secs = self.interval.as_secs_f64() * self.backoff.powi(exponent);
        let capped = delay_secs.min(self.max_interval.as_secs_f64());
        Duration::from_secs_f64(capped)
    }

    /// Wall-clock upper bound across the whole budget
    pub fn total_budget(&self) -> Duration {
        (1..=self.max_attempts).map(|attempt| self.delay_for(attempt)).sum()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(30, Duration::from_secs(6))
    }
}
