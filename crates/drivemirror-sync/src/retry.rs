//! Per-file retry policy
//!
//! A failed upload is retried by the worker that owns it. How often and how
//! long to wait in between is decided here, not in the worker.

use std::time::Duration;

use drivemirror_core::config::{BackoffKind, RetryConfig};

/// Largest exponent applied by [`Backoff::Exponential`]
const MAX_SHIFT: u32 = 16;

/// Delay schedule between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// The same delay every time
    Fixed(Duration),
    /// `base * 2^n`, capped at `max`
    Exponential { base: Duration, max: Duration },
}

impl Backoff {
    /// Delay after the `retry`-th failure (0-based)
    pub fn delay(&self, retry: u32) -> Duration {
        match *self {
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { base, max } => {
                let base_ms = base.as_millis().min(u128::from(u64::MAX)) as u64;
                let max_ms = max.as_millis().min(u128::from(u64::MAX)) as u64;
                let exp = base_ms.saturating_mul(1u64 << retry.min(MAX_SHIFT));
                Duration::from_millis(exp.min(max_ms))
            }
        }
    }
}

/// How many times a file is attempted and how long to wait in between
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per file; `None` retries forever
    max_attempts: Option<u32>,
    backoff: Backoff,
}

impl Default for RetryPolicy {
    /// 10 attempts, 5 seconds apart
    fn default() -> Self {
        Self {
            max_attempts: Some(10),
            backoff: Backoff::Fixed(Duration::from_secs(5)),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: Option<u32>, backoff: Backoff) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// Retries every failure forever with a fixed delay
    ///
    /// A file that can never succeed keeps its worker busy, so this is only
    /// used when explicitly requested.
    pub fn forever(delay: Duration) -> Self {
        Self::new(None, Backoff::Fixed(delay))
    }

    /// Tries each file exactly once
    pub fn no_retry() -> Self {
        Self::new(Some(1), Backoff::Fixed(Duration::ZERO))
    }

    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }

    pub fn backoff(&self) -> Backoff {
        self.backoff
    }

    /// Delay before the next attempt, given how many attempts have failed
    ///
    /// Returns `None` once the attempt budget is spent.
    pub fn next_delay(&self, failed_attempts: u32) -> Option<Duration> {
        if let Some(max) = self.max_attempts {
            if failed_attempts >= max {
                return None;
            }
        }
        Some(self.backoff.delay(failed_attempts.saturating_sub(1)))
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        let base = Duration::from_secs(config.delay_secs);
        let backoff = match config.backoff {
            BackoffKind::Fixed => Backoff::Fixed(base),
            BackoffKind::Exponential => Backoff::Exponential {
                base,
                max: Duration::from_secs(config.max_delay_secs),
            },
        };
        Self::new(config.max_attempts, backoff)
    }
}
