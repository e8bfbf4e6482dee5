//! # Retry policy for subscriber deliveries.
//!
//! [`RetryPolicy`] bundles the attempt budget with a [`BackoffPolicy`].
//! One policy applies per message type (or the bus-wide default); the
//! delivery path consults it independently for every subscriber, so one
//! subscriber exhausting its attempts never affects another.

use std::time::Duration;

use crate::error::SetupError;
use crate::policies::BackoffPolicy;

/// Attempt budget and backoff schedule for delivering one message to one
/// subscriber.
///
/// Attempts are 1-based: `max_attempts = 3` means one initial attempt and
/// up to two retries.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use busbar::{BackoffPolicy, JitterPolicy, RetryPolicy};
///
/// let policy = RetryPolicy {
///     max_attempts: 3,
///     backoff: BackoffPolicy {
///         first: Duration::from_millis(50),
///         max: Duration::from_secs(1),
///         factor: 2.0,
///         jitter: JitterPolicy::None,
///     },
/// };
///
/// // After attempt 1 fails: wait 50ms. After attempt 2: 100ms.
/// assert_eq!(policy.delay_after(1), Some(Duration::from_millis(50)));
/// assert_eq!(policy.delay_after(2), Some(Duration::from_millis(100)));
/// // Attempt 3 was the last one: no further retry.
/// assert_eq!(policy.delay_after(3), None);
/// ```
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Total delivery attempts per subscriber, including the first
    /// (`1` = no retries).
    pub max_attempts: u32,
    /// Delay schedule between attempts.
    pub backoff: BackoffPolicy,
}

impl Default for RetryPolicy {
    /// Returns `max_attempts = 3` with [`BackoffPolicy::default`].
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffPolicy::default(),
        }
    }
}

impl RetryPolicy {
    /// Returns the wait before the next attempt after `failed_attempt`
    /// (1-based) failed, or `None` when the budget is exhausted.
    pub fn delay_after(&self, failed_attempt: u32) -> Option<Duration> {
        if failed_attempt >= self.max_attempts {
            return None;
        }
        Some(self.backoff.next(failed_attempt.saturating_sub(1)))
    }

    /// Validates the policy; called when the bus is built.
    ///
    /// Rejects a zero attempt budget and degenerate backoff factors
    /// (non-finite, zero, or negative).
    pub fn validate(&self) -> Result<(), SetupError> {
        if self.max_attempts == 0 {
            return Err(SetupError::InvalidPolicy {
                reason: "retry max_attempts must be >= 1".into(),
            });
        }
        if !self.backoff.factor.is_finite() || self.backoff.factor <= 0.0 {
            return Err(SetupError::InvalidPolicy {
                reason: format!(
                    "backoff factor must be finite and > 0 (got {})",
                    self.backoff.factor
                ),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policies::JitterPolicy;

    #[test]
    fn test_delay_schedule_is_one_based() {
        let policy = RetryPolicy {
            max_attempts: 4,
            backoff: BackoffPolicy {
                first: Duration::from_millis(100),
                max: Duration::from_secs(10),
                factor: 2.0,
                jitter: JitterPolicy::None,
            },
        };

        assert_eq!(policy.delay_after(1), Some(Duration::from_millis(100)));
        assert_eq!(policy.delay_after(2), Some(Duration::from_millis(200)));
        assert_eq!(policy.delay_after(3), Some(Duration::from_millis(400)));
        assert_eq!(policy.delay_after(4), None);
    }

    #[test]
    fn test_single_attempt_never_retries() {
        let policy = RetryPolicy {
            max_attempts: 1,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_after(1), None);
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let policy = RetryPolicy {
            max_attempts: 0,
            ..RetryPolicy::default()
        };
        assert!(matches!(
            policy.validate(),
            Err(SetupError::InvalidPolicy { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_bad_factor() {
        let mut policy = RetryPolicy::default();
        policy.backoff.factor = f64::NAN;
        assert!(policy.validate().is_err());

        policy.backoff.factor = 0.0;
        assert!(policy.validate().is_err());

        policy.backoff.factor = 1.5;
        assert!(policy.validate().is_ok());
    }
}
