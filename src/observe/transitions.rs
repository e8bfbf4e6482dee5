//! # Transition events and the callback hub.
//!
//! Circuit breakers and the health monitor only change externally visible
//! state through [`TransitionEvent`]s. The [`TransitionHub`] fans each
//! event out to registered callbacks — the alerting hook for operators.
//!
//! ## Flow
//! ```text
//! CircuitBreakers ── state change ──► TransitionHub ──► callback 1
//! HealthMonitor  ── status change ──►      │       ──► callback 2
//!                                          └──────────► callback N
//! ```
//!
//! ## Rules
//! - Callbacks run synchronously on the caller's task; keep them short.
//! - A panicking callback is caught and reported, the rest still run.
//! - The hub never holds its lock while invoking callbacks, so a callback
//!   may re-enter the bus (e.g. call `reset_breaker`) without deadlocking.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use crate::breakers::CircuitState;
use crate::health::HealthStatus;
use crate::message::TypeCode;

/// Handle returned by [`TransitionHub::subscribe`]; pass it back to
/// [`TransitionHub::unsubscribe`] to deregister.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

impl CallbackId {
    /// Raw numeric id.
    #[inline]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// A state change worth alerting on.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum TransitionEvent {
    /// A circuit breaker moved between states.
    Breaker {
        /// The message type whose breaker changed.
        type_code: TypeCode,
        /// State before the transition.
        from: CircuitState,
        /// State after the transition.
        to: CircuitState,
        /// Consecutive failures at the moment of the transition.
        consecutive_failures: u32,
        /// Wall-clock time of the transition.
        at: SystemTime,
    },
    /// The aggregated bus health changed bands.
    Health {
        /// Status before the transition.
        from: HealthStatus,
        /// Status after the transition.
        to: HealthStatus,
        /// Error rate over the evaluation window that drove the change.
        error_rate: f64,
        /// Wall-clock time of the transition.
        at: SystemTime,
    },
}

type Callback = Arc<dyn Fn(&TransitionEvent) + Send + Sync>;

/// Registry of transition callbacks.
///
/// Registration order is preserved and is the invocation order.
pub struct TransitionHub {
    callbacks: RwLock<Vec<(CallbackId, Callback)>>,
    next_id: AtomicU64,
}

impl TransitionHub {
    pub fn new() -> Self {
        Self {
            callbacks: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers `callback` and returns its id.
    pub fn subscribe<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(&TransitionEvent) + Send + Sync + 'static,
    {
        let id = CallbackId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut guard = self
            .callbacks
            .write()
            .unwrap_or_else(|e| e.into_inner());
        guard.push((id, Arc::new(callback)));
        id
    }

    /// Removes the callback registered under `id`.
    ///
    /// Returns `false` when the id is unknown (already removed); the call
    /// is idempotent.
    pub fn unsubscribe(&self, id: CallbackId) -> bool {
        let mut guard = self
            .callbacks
            .write()
            .unwrap_or_else(|e| e.into_inner());
        let before = guard.len();
        guard.retain(|(cb_id, _)| *cb_id != id);
        guard.len() != before
    }

    /// Invokes every registered callback with `event`.
    ///
    /// The callback list is cloned out of the lock first, so callbacks may
    /// subscribe/unsubscribe (or re-enter the bus) freely. Panics are
    /// isolated per callback.
    pub fn notify(&self, event: &TransitionEvent) {
        let snapshot: Vec<Callback> = {
            let guard = self
                .callbacks
                .read()
                .unwrap_or_else(|e| e.into_inner());
            guard.iter().map(|(_, cb)| Arc::clone(cb)).collect()
        };

        for cb in snapshot {
            if let Err(panic_err) = catch_unwind(AssertUnwindSafe(|| cb(event))) {
                let info = {
                    let any = &*panic_err;
                    if let Some(msg) = any.downcast_ref::<&'static str>() {
                        (*msg).to_string()
                    } else if let Some(msg) = any.downcast_ref::<String>() {
                        msg.clone()
                    } else {
                        "unknown panic".to_string()
                    }
                };
                tracing::error!(panic = %info, "transition callback panicked");
            }
        }
    }

    /// Number of registered callbacks.
    pub fn len(&self) -> usize {
        self.callbacks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TransitionHub {
    fn default() -> Self {
        Self::new()
    }
}
