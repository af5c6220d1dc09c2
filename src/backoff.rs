//! Exponential backoff used by the admission controller and the retry engine.
//!
//! Attempt semantics: the delay for attempt `n` is `base * 2^n`, capped at `max`. Attempt `0`
//! is therefore `base` (one second with the defaults), not zero. This is what lets the failure
//! count feed directly into the exponent.
//!
//! Example
//! ```rust
//! use std::time::Duration;
//! use skyguard::Backoff;
//!
//! let backoff = Backoff::default();
//! assert_eq!(backoff.delay(0), Duration::from_secs(1));
//! assert_eq!(backoff.delay(5), Duration::from_secs(32));
//! assert_eq!(backoff.delay(9), Duration::from_secs(300)); // capped
//! ```

use std::time::Duration;

/// Base delay used by [`Backoff::default`].
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Cap used by [`Backoff::default`] (five minutes).
pub const DEFAULT_BACKOFF_CAP: Duration = Duration::from_secs(300);

/// Errors returned by backoff configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackoffError {
    #[error("base delay must be greater than zero")]
    BaseMustBePositive,
    #[error("max ({max:?}) must be >= base ({base:?})")]
    MaxLessThanBase { base: Duration, max: Duration },
}

/// Capped exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
}

impl Backoff {
    /// Exponential backoff starting at `base` with the default five minute cap.
    pub fn exponential(base: Duration) -> Result<Self, BackoffError> {
        if base.is_zero() {
            return Err(BackoffError::BaseMustBePositive);
        }
        Ok(Self { base, max: DEFAULT_BACKOFF_CAP.max(base) })
    }

    /// Replace the cap. Returns an error if `max < base`.
    pub fn with_max(mut self, max: Duration) -> Result<Self, BackoffError> {
        if max < self.base {
            return Err(BackoffError::MaxLessThanBase { base: self.base, max });
        }
        self.max = max;
        Ok(self)
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    /// Delay for `attempt`: `min(base * 2^attempt, max)`. Saturates instead of overflowing.
    pub fn delay(&self, attempt: u32) -> Duration {
        let multiplier = 2u128.saturating_pow(attempt);
        let nanos = self.base.as_nanos().saturating_mul(multiplier);
        if nanos >= self.max.as_nanos() {
            return self.max;
        }
        // nanos < max, which itself fits in a Duration
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self { base: DEFAULT_BACKOFF_BASE, max: DEFAULT_BACKOFF_CAP }
    }
}
