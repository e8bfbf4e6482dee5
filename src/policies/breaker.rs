//! # Circuit-breaker thresholds.
//!
//! [`BreakerPolicy`] parameterizes the per-type circuit breaker: how many
//! consecutive failures trip it, how long it stays open, and how many
//! consecutive probe successes close it again. The state machine itself
//! lives in [`crate::breakers`].

use std::time::Duration;

use crate::error::SetupError;

/// Thresholds for one circuit breaker.
///
/// ### Rules
/// - `failure_threshold` consecutive failures while closed trip the
///   breaker open.
/// - After `open_timeout` the breaker admits probe traffic (half-open).
/// - `success_threshold` consecutive probe successes close it; any probe
///   failure reopens it and restarts the timeout.
#[derive(Clone, Copy, Debug)]
pub struct BreakerPolicy {
    /// Consecutive failures that trip the breaker (default `5`).
    pub failure_threshold: u32,
    /// Consecutive half-open successes that close it (default `2`).
    pub success_threshold: u32,
    /// How long the breaker stays open before probing (default `30s`).
    pub open_timeout: Duration,
}

impl Default for BreakerPolicy {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            open_timeout: Duration::from_secs(30),
        }
    }
}

impl BreakerPolicy {
    /// Validates the thresholds; called when the bus is built.
    pub fn validate(&self) -> Result<(), SetupError> {
        if self.failure_threshold == 0 {
            return Err(SetupError::InvalidPolicy {
                reason: "breaker failure_threshold must be >= 1".into(),
            });
        }
        if self.success_threshold == 0 {
            return Err(SetupError::InvalidPolicy {
                reason: "breaker success_threshold must be >= 1".into(),
            });
        }
        if self.open_timeout.is_zero() {
            return Err(SetupError::InvalidPolicy {
                reason: "breaker open_timeout must be > 0".into(),
            });
        }
        Ok(())
    }
}
