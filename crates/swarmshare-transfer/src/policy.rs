//! Retry and backoff policies.
//!
//! A [`RetryPolicy`] maps a zero-based attempt index to the delay before the
//! next attempt. `None` means the attempts are exhausted and the caller should
//! give up. The same policy type drives availability expiry on the download
//! side and read retries on the upload side; callers own all timing state.

use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum RetryPolicy {
    /// The same delay for every attempt.
    Constant {
        max_attempts: Option<u32>,
        delay: Duration,
    },
    /// `initial * multiplier^attempt`, capped at `max_delay`.
    Exponential {
        max_attempts: Option<u32>,
        initial: Duration,
        multiplier: f64,
        max_delay: Duration,
    },
    /// Zero delay until attempts run out.
    Immediate { max_attempts: Option<u32> },
}

impl RetryPolicy {
    pub fn constant(max_attempts: Option<u32>, delay: Duration) -> Self {
        Self::Constant {
            max_attempts,
            delay,
        }
    }

    pub fn exponential(
        max_attempts: Option<u32>,
        initial: Duration,
        multiplier: f64,
        max_delay: Duration,
    ) -> Self {
        Self::Exponential {
            max_attempts,
            initial,
            multiplier,
            max_delay,
        }
    }

    pub fn immediate(max_attempts: Option<u32>) -> Self {
        Self::Immediate { max_attempts }
    }

    /// Attempt limit, or `None` when attempts are unlimited.
    #[must_use]
    pub fn max_attempts(&self) -> Option<u32> {
        match self {
            Self::Constant { max_attempts, .. }
            | Self::Exponential { max_attempts, .. }
            | Self::Immediate { max_attempts } => *max_attempts,
        }
    }

    /// Delay before attempt `attempt + 1`, or `None` once attempts are exhausted.
    #[must_use]
    pub fn interval(&self, attempt: u32) -> Option<Duration> {
        if self.max_attempts().is_some_and(|max| attempt >= max) {
            return None;
        }
        let delay = match self {
            Self::Constant { delay, .. } => *delay,
            Self::Immediate { .. } => Duration::ZERO,
            Self::Exponential {
                initial,
                multiplier,
                max_delay,
                ..
            } => {
                let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
                let nanos = (initial.as_nanos() as f64 * multiplier.powi(exponent)).round();
                if nanos.is_finite() && nanos < max_delay.as_nanos() as f64 {
                    Duration::from_nanos(nanos as u64)
                } else {
                    *max_delay
                }
            }
        };
        Some(delay)
    }
}
