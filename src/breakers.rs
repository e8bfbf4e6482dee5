//! # Per-type circuit breakers.
//!
//! Each message type gets its own breaker; one failing type never gates
//! the others. The breaker sits in front of fan-out: an open circuit
//! rejects the whole publish before any subscriber is invoked.
//!
//! ## State machine
//! ```text
//!                 failure_threshold
//!                 consecutive failures
//!      ┌────────┐ ─────────────────────► ┌────────┐
//!      │ Closed │                        │  Open  │ ◄────────────┐
//!      └────────┘ ◄───────────────────── └────┬───┘              │
//!           ▲      success_threshold          │ open_timeout     │
//!           │      consecutive successes      │ elapsed          │
//!           │                                 ▼                  │
//!           │                            ┌──────────┐   failure  │
//!           └─────────────────────────── │ HalfOpen │ ───────────┘
//!                                        └──────────┘
//! ```
//!
//! ## Rules
//! - Open → HalfOpen happens lazily inside [`CircuitBreakers::admit`];
//!   [`CircuitBreakers::state`] is a pure read and may report `Open` for a
//!   breaker whose timeout already elapsed but that nobody has probed yet.
//! - Every transition goes out through the [`TransitionHub`] after the
//!   breaker's lock is released, so callbacks may re-enter the bus.
//! - [`CircuitBreakers::reset`] forces `Closed` from any state (operator
//!   intervention).

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use crate::clock::Clock;
use crate::error::PublishError;
use crate::message::TypeCode;
use crate::observe::{TransitionEvent, TransitionHub};
use crate::policies::BreakerPolicy;

/// Position of one breaker in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation; failures are counted.
    Closed,
    /// Tripped; publishes for this type are rejected.
    Open,
    /// Probing; traffic is admitted while the breaker decides.
    HalfOpen,
}

impl CircuitState {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Mutable state of one breaker, guarded by its own mutex.
struct BreakerCell {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    /// Set whenever the breaker enters `Open`.
    opened_at: Option<Instant>,
    policy: BreakerPolicy,
}

impl BreakerCell {
    fn new(policy: BreakerPolicy) -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            opened_at: None,
            policy,
        }
    }
}

/// All breakers, keyed by type code. Cells are created on first contact.
pub(crate) struct CircuitBreakers {
    cells: RwLock<HashMap<TypeCode, Arc<Mutex<BreakerCell>>>>,
    default_policy: BreakerPolicy,
    overrides: HashMap<TypeCode, BreakerPolicy>,
    clock: Arc<dyn Clock>,
    hub: Arc<TransitionHub>,
}

impl CircuitBreakers {
    pub(crate) fn new(
        default_policy: BreakerPolicy,
        overrides: HashMap<TypeCode, BreakerPolicy>,
        clock: Arc<dyn Clock>,
        hub: Arc<TransitionHub>,
    ) -> Self {
        Self {
            cells: RwLock::new(HashMap::new()),
            default_policy,
            overrides,
            clock,
            hub,
        }
    }

    fn cell(&self, code: TypeCode) -> Arc<Mutex<BreakerCell>> {
        {
            let cells = self.cells.read().unwrap_or_else(|e| e.into_inner());
            if let Some(cell) = cells.get(&code) {
                return Arc::clone(cell);
            }
        }
        let mut cells = self.cells.write().unwrap_or_else(|e| e.into_inner());
        let policy = self.overrides.get(&code).copied().unwrap_or(self.default_policy);
        Arc::clone(
            cells
                .entry(code)
                .or_insert_with(|| Arc::new(Mutex::new(BreakerCell::new(policy)))),
        )
    }

    fn transition(
        &self,
        code: TypeCode,
        cell: &mut BreakerCell,
        to: CircuitState,
    ) -> TransitionEvent {
        let from = cell.state;
        cell.state = to;
        if to == CircuitState::Open {
            cell.opened_at = Some(self.clock.now());
        }
        TransitionEvent::Breaker {
            type_code: code,
            from,
            to,
            consecutive_failures: cell.consecutive_failures,
            at: self.clock.wall(),
        }
    }

    /// Gate check at the start of a publish. Retry attempts that follow
    /// feed `record_success`/`record_failure` but are not re-gated.
    ///
    /// - `Closed` / `HalfOpen`: admits.
    /// - `Open` with the timeout elapsed: promotes to `HalfOpen`, admits.
    /// - `Open` otherwise: rejects with the remaining wait.
    pub(crate) fn admit(&self, code: TypeCode) -> Result<(), PublishError> {
        let cell = self.cell(code);
        let event = {
            let mut guard = cell.lock().unwrap_or_else(|e| e.into_inner());
            match guard.state {
                CircuitState::Closed | CircuitState::HalfOpen => None,
                CircuitState::Open => {
                    let elapsed = guard
                        .opened_at
                        .map(|at| self.clock.now().duration_since(at))
                        .unwrap_or_default();
                    if elapsed < guard.policy.open_timeout {
                        return Err(PublishError::CircuitOpen {
                            code,
                            retry_after: guard.policy.open_timeout - elapsed,
                        });
                    }
                    guard.consecutive_successes = 0;
                    Some(self.transition(code, &mut guard, CircuitState::HalfOpen))
                }
            }
        };
        if let Some(event) = event {
            self.hub.notify(&event);
        }
        Ok(())
    }

    /// Feeds one successful delivery attempt into the breaker.
    pub(crate) fn record_success(&self, code: TypeCode) {
        let cell = self.cell(code);
        let event = {
            let mut guard = cell.lock().unwrap_or_else(|e| e.into_inner());
            match guard.state {
                CircuitState::Closed => {
                    guard.consecutive_failures = 0;
                    None
                }
                CircuitState::HalfOpen => {
                    guard.consecutive_successes += 1;
                    if guard.consecutive_successes >= guard.policy.success_threshold {
                        guard.consecutive_failures = 0;
                        guard.consecutive_successes = 0;
                        guard.opened_at = None;
                        Some(self.transition(code, &mut guard, CircuitState::Closed))
                    } else {
                        None
                    }
                }
                // A success from an attempt that raced the trip; the
                // breaker waits for its timeout regardless.
                CircuitState::Open => None,
            }
        };
        if let Some(event) = event {
            self.hub.notify(&event);
        }
    }

    /// Feeds one failed delivery attempt into the breaker.
    pub(crate) fn record_failure(&self, code: TypeCode) {
        let cell = self.cell(code);
        let event = {
            let mut guard = cell.lock().unwrap_or_else(|e| e.into_inner());
            match guard.state {
                CircuitState::Closed => {
                    guard.consecutive_failures += 1;
                    if guard.consecutive_failures >= guard.policy.failure_threshold {
                        Some(self.transition(code, &mut guard, CircuitState::Open))
                    } else {
                        None
                    }
                }
                CircuitState::HalfOpen => {
                    // One failed probe reopens and restarts the timeout.
                    guard.consecutive_failures += 1;
                    guard.consecutive_successes = 0;
                    Some(self.transition(code, &mut guard, CircuitState::Open))
                }
                CircuitState::Open => {
                    guard.consecutive_failures += 1;
                    None
                }
            }
        };
        if let Some(event) = event {
            self.hub.notify(&event);
        }
    }

    /// Current state of the breaker for `code` (pure read).
    pub(crate) fn state(&self, code: TypeCode) -> CircuitState {
        let cells = self.cells.read().unwrap_or_else(|e| e.into_inner());
        match cells.get(&code) {
            None => CircuitState::Closed,
            Some(cell) => cell.lock().unwrap_or_else(|e| e.into_inner()).state,
        }
    }

    /// Whether the breaker for `code` is currently `Open`.
    pub(crate) fn is_open(&self, code: TypeCode) -> bool {
        self.state(code) == CircuitState::Open
    }

    /// Forces the breaker back to `Closed` and clears its counters.
    pub(crate) fn reset(&self, code: TypeCode) {
        let cell = self.cell(code);
        let event = {
            let mut guard = cell.lock().unwrap_or_else(|e| e.into_inner());
            guard.consecutive_failures = 0;
            guard.consecutive_successes = 0;
            guard.opened_at = None;
            if guard.state == CircuitState::Closed {
                None
            } else {
                Some(self.transition(code, &mut guard, CircuitState::Closed))
            }
        };
        if let Some(event) = event {
            self.hub.notify(&event);
        }
    }
}
