//! # BusBuilder: fluent assembly for [`MessageBus`].
//!
//! The builder validates the configuration once, wires every component
//! (registry, subscription table, breakers, dead letter store,
//! statistics, health monitor, transition hub), and returns the bus in
//! an `Arc` ready to be shared across tasks.
//!
//! ## Seams
//! - [`BusBuilder::with_clock`] — injectable time source, primarily for
//!   deterministic breaker/health tests.
//! - [`BusBuilder::with_logger`] / [`BusBuilder::with_metrics`] — pluggable
//!   sinks; defaults are `tracing` forwarding and a no-op.
//! - [`BusBuilder::with_retry_override`] / [`BusBuilder::with_breaker_override`]
//!   — per-type policies layered over the bus-wide defaults.
//!
//! ## Example
//! ```
//! use std::time::Duration;
//! use busbar::{BreakerPolicy, BusConfig, MessageBus};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let bus = MessageBus::builder(BusConfig::default())
//!     // Payment downstreams flap; trip their breaker sooner.
//!     .with_breaker_override(
//!         7,
//!         BreakerPolicy {
//!             failure_threshold: 3,
//!             success_threshold: 2,
//!             open_timeout: Duration::from_secs(10),
//!         },
//!     )
//!     .build()?;
//! assert_eq!(bus.subscriber_count(7), 0);
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use crate::breakers::CircuitBreakers;
use crate::bus::core::BusParts;
use crate::bus::MessageBus;
use crate::clock::{Clock, SystemClock};
use crate::config::BusConfig;
use crate::dead_letter::DeadLetterStore;
use crate::error::SetupError;
use crate::health::HealthMonitor;
use crate::message::TypeCode;
use crate::observe::{LogSink, MetricsSink, NoopMetrics, TracingLog, TransitionEvent, TransitionHub};
use crate::policies::{BreakerPolicy, RetryPolicy};
use crate::registry::TypeRegistry;
use crate::stats::BusStatistics;
use crate::subscriptions::SubscriptionTable;

type TransitionCallback = Box<dyn Fn(&TransitionEvent) + Send + Sync>;

/// Fluent builder returned by [`MessageBus::builder`].
pub struct BusBuilder {
    config: BusConfig,
    clock: Arc<dyn Clock>,
    log: Arc<dyn LogSink>,
    metrics: Arc<dyn MetricsSink>,
    retry_overrides: HashMap<TypeCode, RetryPolicy>,
    breaker_overrides: HashMap<TypeCode, BreakerPolicy>,
    callbacks: Vec<TransitionCallback>,
}

impl BusBuilder {
    /// Starts a builder over `config`; validation happens in
    /// [`BusBuilder::build`].
    pub fn new(config: BusConfig) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock),
            log: Arc::new(TracingLog),
            metrics: Arc::new(NoopMetrics),
            retry_overrides: HashMap::new(),
            breaker_overrides: HashMap::new(),
            callbacks: Vec::new(),
        }
    }

    /// Replaces the time source (see [`crate::ManualClock`] for tests).
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the log sink. The default forwards to `tracing`, which
    /// stays silent until a subscriber is installed.
    #[must_use]
    pub fn with_logger(mut self, log: Arc<dyn LogSink>) -> Self {
        self.log = log;
        self
    }

    /// Replaces the metrics sink (default: no-op).
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Overrides the retry policy for one message type.
    #[must_use]
    pub fn with_retry_override(mut self, code: TypeCode, policy: RetryPolicy) -> Self {
        self.retry_overrides.insert(code, policy);
        self
    }

    /// Overrides the breaker policy for one message type.
    #[must_use]
    pub fn with_breaker_override(mut self, code: TypeCode, policy: BreakerPolicy) -> Self {
        self.breaker_overrides.insert(code, policy);
        self
    }

    /// Registers a transition callback before the bus starts, so no
    /// early breaker trip can be missed.
    #[must_use]
    pub fn with_transition_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&TransitionEvent) + Send + Sync + 'static,
    {
        self.callbacks.push(Box::new(callback));
        self
    }

    /// Validates every policy and assembles the bus.
    ///
    /// ### Errors
    /// [`SetupError::InvalidPolicy`] when the base configuration or any
    /// per-type override is degenerate (zero attempts, zero thresholds,
    /// bad backoff factor, out-of-range health rates).
    pub fn build(self) -> Result<Arc<MessageBus>, SetupError> {
        self.config.validate()?;
        for (code, policy) in &self.retry_overrides {
            policy.validate().map_err(|err| annotate(*code, err))?;
        }
        for (code, policy) in &self.breaker_overrides {
            policy.validate().map_err(|err| annotate(*code, err))?;
        }

        let hub = Arc::new(TransitionHub::new());
        {
            // Breaker flips are operationally loud by default; health
            // transitions are logged by the monitor itself.
            let log = Arc::clone(&self.log);
            let metrics = Arc::clone(&self.metrics);
            hub.subscribe(move |event| {
                if let TransitionEvent::Breaker {
                    type_code,
                    from,
                    to,
                    consecutive_failures,
                    ..
                } = event
                {
                    metrics.counter("bus_breaker_transitions_total", 1);
                    log.info(
                        "breaker",
                        &format!(
                            "breaker for type {type_code}: {from} -> {to} \
                             (consecutive failures: {consecutive_failures})"
                        ),
                        None,
                    );
                }
            });
        }
        for callback in self.callbacks {
            hub.subscribe(callback);
        }

        let stats = Arc::new(BusStatistics::new());
        let table = Arc::new(SubscriptionTable::new());
        let breakers = CircuitBreakers::new(
            self.config.breaker,
            self.breaker_overrides,
            Arc::clone(&self.clock),
            Arc::clone(&hub),
        );
        let health = Arc::new(HealthMonitor::new(
            self.config.health,
            Arc::clone(&stats),
            Arc::clone(&table),
            Arc::clone(&hub),
            Arc::clone(&self.clock),
            Arc::clone(&self.log),
        ));

        Ok(Arc::new(MessageBus::new_internal(BusParts {
            registry: TypeRegistry::new(),
            table,
            breakers,
            dead_letters: DeadLetterStore::new(self.config.dead_letter_capacity),
            stats,
            health,
            hub,
            retry_default: self.config.retry,
            retry_overrides: self.retry_overrides,
            clock: self.clock,
            log: self.log,
            metrics: self.metrics,
        })))
    }
}

fn annotate(code: TypeCode, err: SetupError) -> SetupError {
    match err {
        SetupError::InvalidPolicy { reason } => SetupError::InvalidPolicy {
            reason: format!("type {code}: {reason}"),
        },
        other => other,
    }
}
