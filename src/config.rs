//! # Global bus configuration.
//!
//! [`BusConfig`] centralizes the bus-wide defaults: the retry policy,
//! the breaker policy, dead-letter capacity, and health thresholds.
//! Per-type overrides for retry/breaker policies are added through
//! `MessageBus::builder`, not here.
//!
//! # Example
//! ```
//! use std::time::Duration;
//! use busbar::{BreakerPolicy, BusConfig};
//!
//! let mut cfg = BusConfig::default();
//! cfg.retry.max_attempts = 5;
//! cfg.breaker = BreakerPolicy {
//!     failure_threshold: 3,
//!     success_threshold: 1,
//!     open_timeout: Duration::from_secs(10),
//! };
//! cfg.dead_letter_capacity = 512;
//!
//! assert!(cfg.validate().is_ok());
//! ```

use crate::error::SetupError;
use crate::health::HealthThresholds;
use crate::policies::{BreakerPolicy, RetryPolicy};

/// Global configuration for a message bus.
///
/// All fields are public for flexibility; [`BusConfig::validate`] runs at
/// build time, so an invalid combination never reaches a live bus.
#[derive(Clone, Copy, Debug)]
pub struct BusConfig {
    /// Default per-subscriber retry policy.
    ///
    /// Can be overridden per message type via the builder.
    pub retry: RetryPolicy,

    /// Default circuit-breaker thresholds.
    ///
    /// Can be overridden per message type via the builder.
    pub breaker: BreakerPolicy,

    /// Dead-letter capacity per message type.
    ///
    /// When a type's queue is full, the oldest entry is evicted to admit
    /// the newest. Must be at least 1.
    pub dead_letter_capacity: usize,

    /// Health status band boundaries.
    pub health: HealthThresholds,
}

impl BusConfig {
    /// Validates every embedded policy.
    pub fn validate(&self) -> Result<(), SetupError> {
        self.retry.validate()?;
        self.breaker.validate()?;
        self.health.validate()?;
        if self.dead_letter_capacity == 0 {
            return Err(SetupError::InvalidPolicy {
                reason: "dead_letter_capacity must be >= 1".into(),
            });
        }
        Ok(())
    }
}

impl Default for BusConfig {
    /// Default configuration:
    ///
    /// - `retry = RetryPolicy::default()` (3 attempts, exponential backoff)
    /// - `breaker = BreakerPolicy::default()` (trip at 5, close at 2, 30s open)
    /// - `dead_letter_capacity = 2048` per type
    /// - `health = HealthThresholds::default()` (50% / 10% / 1s)
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            breaker: BreakerPolicy::default(),
            dead_letter_capacity: 2048,
            health: HealthThresholds::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(BusConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let mut cfg = BusConfig::default();
        cfg.dead_letter_capacity = 0;
        assert!(matches!(
            cfg.validate(),
            Err(SetupError::InvalidPolicy { .. })
        ));
    }

    #[test]
    fn test_validation_covers_embedded_policies() {
        let mut cfg = BusConfig::default();
        cfg.retry.max_attempts = 0;
        assert!(cfg.validate().is_err());

        cfg = BusConfig::default();
        cfg.breaker.failure_threshold = 0;
        assert!(cfg.validate().is_err());

        cfg = BusConfig::default();
        cfg.health.degraded_error_rate = 2.0;
        assert!(cfg.validate().is_err());
    }
}
