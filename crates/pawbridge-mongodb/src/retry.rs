//! Backoff for opening the storage connection.
//!
//! The configured retry timeout is the delay before the first retry; each further retry
//! waits twice as long, up to `max_delay`.

use std::time::Duration;

/// Default delay before the first retry
pub const DEFAULT_RETRY_TIMEOUT: Duration = Duration::from_secs(2);

const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// How often, and how patiently, a failed connect is retried
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Wait before the first retry
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Spread retries of several processes by up to a quarter of the delay
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, DEFAULT_RETRY_TIMEOUT).with_jitter(true)
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
            max_delay: DEFAULT_MAX_DELAY.max(initial_delay),
            jitter: false,
        }
    }

    /// Fail on the first connect error
    pub fn disabled() -> Self {
        Self::new(0, Duration::ZERO)
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Whether another attempt is allowed after `failures` failed attempts
    pub fn should_retry(&self, failures: u32) -> bool {
        failures < self.max_retries
    }

    /// Wait before retry number `retry` (1-based)
    pub fn backoff(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }

        let factor = 1u32 << retry.saturating_sub(1).min(16);
        let delay = self
            .initial_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay));

        if self.jitter {
            delay.mul_f64(1.0 + jitter_fraction() * 0.25)
        } else {
            delay
        }
    }
}

/// Pseudo-random value in `[0, 1)` taken from the clock
fn jitter_fraction() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    (nanos % 1000) as f64 / 1000.0
}
