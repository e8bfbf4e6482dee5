//! # Backoff policy for delivery retries.
//!
//! [`BackoffPolicy`] controls how the wait between delivery attempts
//! grows after repeated failures. It is parameterized by:
//! - [`BackoffPolicy::first`] the delay before the first retry;
//! - [`BackoffPolicy::factor`] the multiplicative growth factor;
//! - [`BackoffPolicy::max`] the maximum delay cap.
//!
//! The delay before retry `n` (0-indexed) is `first × factor^n`, clamped
//! to `max`, then jitter is applied. Because the base derives purely from
//! the retry index, jitter output never feeds back into later
//! calculations — a long retry sequence cannot drift below its schedule.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use busbar::{BackoffPolicy, JitterPolicy};
//!
//! let backoff = BackoffPolicy {
//!     first: Duration::from_millis(100),
//!     max: Duration::from_secs(5),
//!     factor: 2.0,
//!     jitter: JitterPolicy::None,
//! };
//!
//! // Retry 0 — uses `first`
//! assert_eq!(backoff.next(0), Duration::from_millis(100));
//! // Retry 1 — 100ms × 2
//! assert_eq!(backoff.next(1), Duration::from_millis(200));
//! // Retry 10 — 100ms × 2^10 = 102.4s → capped at 5s
//! assert_eq!(backoff.next(10), Duration::from_secs(5));
//! ```

use std::time::Duration;

use crate::policies::JitterPolicy;

/// Retry backoff schedule.
///
/// Shared by every subscriber delivery of a message type (see
/// [`RetryPolicy`](crate::RetryPolicy)); the delay is computed per retry
/// index, so concurrent deliveries never share mutable backoff state.
#[derive(Clone, Copy, Debug)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub first: Duration,
    /// Maximum delay cap.
    pub max: Duration,
    /// Multiplicative growth factor (`>= 1.0` recommended).
    pub factor: f64,
    /// Randomization applied to the computed delay.
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// Returns exponential backoff: `first = 100ms`, `factor = 2.0`,
    /// `max = 5s`, no jitter.
    fn default() -> Self {
        Self {
            first: Duration::from_millis(100),
            max: Duration::from_secs(5),
            factor: 2.0,
            jitter: JitterPolicy::None,
        }
    }
}

impl BackoffPolicy {
    /// Computes the delay before retry `retry` (0-indexed).
    ///
    /// The base is `first × factor^retry`, clamped to [`BackoffPolicy::max`];
    /// jitter is applied to the clamped base. Non-finite or negative
    /// intermediate values (enormous factors or retry indexes) clamp to
    /// `max`.
    pub fn next(&self, retry: u32) -> Duration {
        let max_secs = self.max.as_secs_f64();
        let exponent = retry.min(i32::MAX as u32) as i32;
        let raw_secs = self.first.as_secs_f64() * self.factor.powi(exponent);

        let base = if !raw_secs.is_finite() || raw_secs < 0.0 || raw_secs > max_secs {
            self.max
        } else {
            Duration::from_secs_f64(raw_secs)
        };

        self.jitter.apply(base, self.first.min(self.max), self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(first_ms: u64, max: Duration, factor: f64) -> BackoffPolicy {
        BackoffPolicy {
            first: Duration::from_millis(first_ms),
            max,
            factor,
            jitter: JitterPolicy::None,
        }
    }

    #[test]
    fn test_retry_zero_returns_first() {
        let policy = plain(100, Duration::from_secs(30), 2.0);
        assert_eq!(policy.next(0), Duration::from_millis(100));
    }

    #[test]
    fn test_exponential_growth() {
        let policy = plain(100, Duration::from_secs(30), 2.0);
        assert_eq!(policy.next(1), Duration::from_millis(200));
        assert_eq!(policy.next(2), Duration::from_millis(400));
        assert_eq!(policy.next(3), Duration::from_millis(800));
    }

    #[test]
    fn test_constant_factor() {
        let policy = plain(500, Duration::from_secs(30), 1.0);
        for retry in 0..10 {
            assert_eq!(policy.next(retry), Duration::from_millis(500));
        }
    }

    #[test]
    fn test_clamped_to_max() {
        let policy = plain(100, Duration::from_secs(1), 2.0);
        assert_eq!(policy.next(10), Duration::from_secs(1));
    }

    #[test]
    fn test_first_exceeding_max_clamps() {
        let policy = plain(10_000, Duration::from_secs(5), 2.0);
        assert_eq!(policy.next(0), Duration::from_secs(5));
    }

    #[test]
    fn test_huge_retry_index_clamps() {
        let policy = plain(100, Duration::from_secs(60), 2.0);
        assert_eq!(policy.next(u32::MAX), Duration::from_secs(60));
    }

    #[test]
    fn test_full_jitter_bounded_by_schedule() {
        let policy = BackoffPolicy {
            first: Duration::from_millis(100),
            max: Duration::from_secs(30),
            factor: 2.0,
            jitter: JitterPolicy::Full,
        };
        for retry in 0..12 {
            let base_ms = (100.0 * 2.0f64.powi(retry)).min(30_000.0);
            let delay = policy.next(retry as u32);
            assert!(
                delay <= Duration::from_millis(base_ms as u64),
                "retry {retry}: {delay:?} exceeds base {base_ms}ms"
            );
        }
    }

    #[test]
    fn test_equal_jitter_keeps_half() {
        let policy = BackoffPolicy {
            first: Duration::from_millis(1000),
            max: Duration::from_secs(30),
            factor: 1.0,
            jitter: JitterPolicy::Equal,
        };
        for _ in 0..50 {
            let delay = policy.next(0);
            assert!(delay >= Duration::from_millis(500));
            assert!(delay <= Duration::from_millis(1000));
        }
    }
}
