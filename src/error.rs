//! Error types used by the bus runtime and message handlers.
//!
//! This module defines four error enums, split by who observes them:
//!
//! - [`SetupError`] — configuration and registration failures, surfaced
//!   synchronously to the caller performing setup.
//! - [`PublishError`] — reasons a publish call is rejected before fan-out.
//! - [`HandlerError`] — failures raised by individual subscriber handlers;
//!   isolated per subscriber and never propagated to the publisher.
//! - [`ReplayError`] — dead-letter replay misses.
//!
//! All types provide `as_label()` for stable snake_case identifiers in
//! logs/metrics, and [`HandlerError`] additionally exposes
//! [`HandlerError::is_retryable`].

use std::time::Duration;
use thiserror::Error;

use crate::message::{MessageId, TypeCode};

/// # Errors raised at setup time.
///
/// These represent misconfiguration: duplicate type registration, invalid
/// retry/breaker policies, or subscribing into a disposed scope. They are
/// returned synchronously from the call that caused them and never occur
/// on the delivery path.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SetupError {
    /// The type code or name is already registered to a different entry.
    #[error("type {code} ({name:?}) conflicts with an existing registration")]
    DuplicateType {
        /// The conflicting type code.
        code: TypeCode,
        /// The name the caller tried to register.
        name: String,
    },

    /// A retry or breaker policy failed validation.
    #[error("invalid policy: {reason}")]
    InvalidPolicy {
        /// Human-readable validation failure.
        reason: String,
    },

    /// The target scope was already disposed.
    #[error("scope {scope} is disposed; subscriptions can no longer be added to it")]
    ScopeDisposed {
        /// Identifier of the disposed scope.
        scope: u64,
    },
}

impl SetupError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use busbar::SetupError;
    ///
    /// let err = SetupError::InvalidPolicy { reason: "max_attempts must be >= 1".into() };
    /// assert_eq!(err.as_label(), "setup_invalid_policy");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            SetupError::DuplicateType { .. } => "setup_duplicate_type",
            SetupError::InvalidPolicy { .. } => "setup_invalid_policy",
            SetupError::ScopeDisposed { .. } => "setup_scope_disposed",
        }
    }
}

/// # Reasons a publish call is rejected before fan-out.
///
/// Both variants are recoverable from the caller's perspective:
/// an unregistered type can be registered and the publish retried, and an
/// open circuit admits traffic again once its timeout elapses.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum PublishError {
    /// No name is registered for the message's type code.
    #[error("type code {code} is not registered")]
    NotRegistered {
        /// The unknown type code.
        code: TypeCode,
    },

    /// The circuit breaker for this type is open; delivery was skipped.
    #[error("circuit open for type {code}; retry in ~{retry_after:?}")]
    CircuitOpen {
        /// The gated type code.
        code: TypeCode,
        /// Time remaining until the breaker half-opens (zero if imminent).
        retry_after: Duration,
    },
}

impl PublishError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            PublishError::NotRegistered { .. } => "publish_not_registered",
            PublishError::CircuitOpen { .. } => "publish_circuit_open",
        }
    }
}

/// # Failures raised by subscriber handlers.
///
/// A handler failure is always local to one subscriber: it feeds the
/// circuit breaker and statistics, may end in the dead-letter store, and
/// never aborts delivery to other subscribers.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum HandlerError {
    /// Transient failure; the delivery may succeed if retried.
    #[error("handler failed: {error}")]
    Retryable {
        /// The underlying error message.
        error: String,
    },

    /// Non-recoverable failure; remaining retry attempts are skipped.
    #[error("handler failed fatally (no retry): {error}")]
    Fatal {
        /// The underlying error message.
        error: String,
    },
}

impl HandlerError {
    /// Convenience constructor for a retryable failure.
    pub fn retryable(error: impl Into<String>) -> Self {
        HandlerError::Retryable {
            error: error.into(),
        }
    }

    /// Convenience constructor for a fatal failure.
    pub fn fatal(error: impl Into<String>) -> Self {
        HandlerError::Fatal {
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            HandlerError::Retryable { .. } => "handler_retryable",
            HandlerError::Fatal { .. } => "handler_fatal",
        }
    }

    /// Indicates whether the retry coordinator may attempt again.
    ///
    /// # Example
    /// ```
    /// use busbar::HandlerError;
    ///
    /// assert!(HandlerError::retryable("connection refused").is_retryable());
    /// assert!(!HandlerError::fatal("schema mismatch").is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        matches!(self, HandlerError::Retryable { .. })
    }
}

/// # Dead-letter replay misses.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ReplayError {
    /// No dead-letter entry exists for the given type and message id.
    #[error("no dead letter for type {code} with message id {id}")]
    NotFound {
        /// The queried type code.
        code: TypeCode,
        /// The queried message id.
        id: MessageId,
    },
}

impl ReplayError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ReplayError::NotFound { .. } => "replay_not_found",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handler_error_retryability() {
        assert!(HandlerError::retryable("boom").is_retryable());
        assert!(!HandlerError::fatal("boom").is_retryable());
    }

    #[test]
    fn test_labels_are_stable() {
        let dup = SetupError::DuplicateType {
            code: 7,
            name: "x".into(),
        };
        assert_eq!(dup.as_label(), "setup_duplicate_type");

        let open = PublishError::CircuitOpen {
            code: 7,
            retry_after: Duration::from_secs(1),
        };
        assert_eq!(open.as_label(), "publish_circuit_open");
    }

    #[test]
    fn test_display_mentions_code() {
        let err = PublishError::NotRegistered { code: 42 };
        assert!(err.to_string().contains("42"));
    }
}
