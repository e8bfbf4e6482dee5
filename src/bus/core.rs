//! # MessageBus: the public-facing orchestrator.
//!
//! The [`MessageBus`] owns every component and sequences the publish
//! pipeline. It is the only entry point; registry, table, breakers,
//! dead letters, statistics, and health are reached through it.
//!
//! ## Publish pipeline
//! ```text
//! publish(msg)
//!   ├─► registry.lookup(type)            ──► Err(NotRegistered)
//!   ├─► breakers.admit(type)             ──► Err(CircuitOpen), counted as rejected
//!   ├─► table.snapshot(type)             (ordered, copy-on-read)
//!   │
//!   ├─► for each subscriber, in subscription order:
//!   │     ├─ cancelled?                  ──► stop, receipt.cancelled = true
//!   │     ├─ filter / priority floor     ──► skip, counted as filtered
//!   │     └─ deliver_with_retry(...)     (attempts feed the breaker)
//!   │           ├─ Delivered             ──► stats.delivered (+ latency)
//!   │           ├─ Exhausted / Fatal     ──► stats.failed + dead letter
//!   │           └─ Cancelled             ──► stop, receipt.cancelled = true
//!   │
//!   └─► Ok(PublishReceipt)
//! ```
//!
//! ## Rules
//! - Per-subscriber failures never abort the fan-out and never surface
//!   as publish errors; publishers observe them via statistics, health,
//!   and the dead letter store.
//! - The subscriber snapshot is taken once per publish; handlers may
//!   subscribe/unsubscribe during delivery without affecting the
//!   in-flight fan-out.
//! - Replay hands a dead letter back to the caller; it never republishes
//!   on its own (no hidden retry storms).
//!
//! ## Example
//! ```
//! use busbar::{BusConfig, HandlerError, HandlerFn, Message, MessageBus};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bus = MessageBus::builder(BusConfig::default()).build()?;
//!
//!     bus.register_type(42, "OrderPlaced")?;
//!     bus.subscribe(
//!         42,
//!         HandlerFn::arc("billing", |msg: Message| async move {
//!             println!("billing saw {}", msg.id());
//!             Ok::<_, HandlerError>(())
//!         }),
//!     );
//!
//!     let receipt = bus.publish(Message::new(42, "order #1")).await?;
//!     assert_eq!(receipt.delivered, 1);
//!     Ok(())
//! }
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::breakers::{CircuitBreakers, CircuitState};
use crate::bus::delivery::{deliver_with_retry, DeliveryContext, DeliveryOutcome};
use crate::bus::{BusBuilder, PublishReceipt};
use crate::clock::Clock;
use crate::config::BusConfig;
use crate::dead_letter::{DeadLetterStore, FailedMessage};
use crate::error::{HandlerError, PublishError, ReplayError, SetupError};
use crate::health::{HealthMonitor, HealthReport, HealthStatus};
use crate::message::{Message, MessageId, TypeCode};
use crate::observe::{CallbackId, LogSink, MetricsSink, TransitionEvent, TransitionHub};
use crate::policies::RetryPolicy;
use crate::registry::TypeRegistry;
use crate::stats::{BusStatistics, StatsSnapshot};
use crate::subscriptions::{
    HandlerRef, ScopeId, SubscribeOptions, SubscriptionHandle, SubscriptionTable,
};

/// Typed in-process message bus with per-type circuit breakers, retries,
/// and a dead letter store.
pub struct MessageBus {
    registry: TypeRegistry,
    table: Arc<SubscriptionTable>,
    breakers: CircuitBreakers,
    dead_letters: DeadLetterStore,
    stats: Arc<BusStatistics>,
    health: Arc<HealthMonitor>,
    hub: Arc<TransitionHub>,
    retry_default: RetryPolicy,
    retry_overrides: HashMap<TypeCode, RetryPolicy>,
    clock: Arc<dyn Clock>,
    log: Arc<dyn LogSink>,
    metrics: Arc<dyn MetricsSink>,
}

impl std::fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageBus").finish_non_exhaustive()
    }
}

/// Pieces assembled by [`BusBuilder::build`].
pub(crate) struct BusParts {
    pub(crate) registry: TypeRegistry,
    pub(crate) table: Arc<SubscriptionTable>,
    pub(crate) breakers: CircuitBreakers,
    pub(crate) dead_letters: DeadLetterStore,
    pub(crate) stats: Arc<BusStatistics>,
    pub(crate) health: Arc<HealthMonitor>,
    pub(crate) hub: Arc<TransitionHub>,
    pub(crate) retry_default: RetryPolicy,
    pub(crate) retry_overrides: HashMap<TypeCode, RetryPolicy>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) log: Arc<dyn LogSink>,
    pub(crate) metrics: Arc<dyn MetricsSink>,
}

impl MessageBus {
    /// Starts a fluent builder; see [`BusBuilder`].
    pub fn builder(config: BusConfig) -> BusBuilder {
        BusBuilder::new(config)
    }

    /// Builds a bus with the given configuration and default seams.
    pub fn new(config: BusConfig) -> Result<Arc<Self>, SetupError> {
        Self::builder(config).build()
    }

    pub(crate) fn new_internal(parts: BusParts) -> Self {
        Self {
            registry: parts.registry,
            table: parts.table,
            breakers: parts.breakers,
            dead_letters: parts.dead_letters,
            stats: parts.stats,
            health: parts.health,
            hub: parts.hub,
            retry_default: parts.retry_default,
            retry_overrides: parts.retry_overrides,
            clock: parts.clock,
            log: parts.log,
            metrics: parts.metrics,
        }
    }

    // ---------------------------
    // Registry
    // ---------------------------

    /// Registers a message type. Both the code and the name must be new.
    pub fn register_type(
        &self,
        code: TypeCode,
        name: impl Into<Arc<str>>,
    ) -> Result<(), SetupError> {
        let name = name.into();
        self.registry.register(code, Arc::clone(&name))?;
        self.log
            .debug("registry", &format!("type registered: {code} -> {name}"), None);
        Ok(())
    }

    /// The registered name for `code`, if any.
    pub fn type_name(&self, code: TypeCode) -> Option<Arc<str>> {
        self.registry.lookup(code).ok()
    }

    // ---------------------------
    // Subscriptions
    // ---------------------------

    /// Subscribes `handler` to `type_code` with no filter.
    ///
    /// Registration of the type is not required to subscribe; a
    /// subscription to a never-published type simply stays idle.
    pub fn subscribe(&self, type_code: TypeCode, handler: HandlerRef) -> SubscriptionHandle {
        self.subscribe_with(type_code, handler, SubscribeOptions::new())
    }

    /// Subscribes with a filter and/or priority floor.
    pub fn subscribe_with(
        &self,
        type_code: TypeCode,
        handler: HandlerRef,
        options: SubscribeOptions,
    ) -> SubscriptionHandle {
        self.table.subscribe(type_code, handler, options)
    }

    /// Subscribes under `scope`, so disposing the scope cancels the
    /// subscription. Fails if the scope was already disposed.
    pub fn subscribe_in_scope(
        &self,
        scope: ScopeId,
        type_code: TypeCode,
        handler: HandlerRef,
        options: SubscribeOptions,
    ) -> Result<SubscriptionHandle, SetupError> {
        self.table.subscribe_in_scope(scope, type_code, handler, options)
    }

    /// Removes one subscription; `false` when it was already gone.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        self.table.unsubscribe(handle)
    }

    /// Pauses (`false`) or resumes (`true`) a subscription in place.
    pub fn set_enabled(&self, handle: SubscriptionHandle, enabled: bool) -> bool {
        self.table.set_enabled(handle, enabled)
    }

    /// Mints a subscription scope for bulk cancellation.
    pub fn create_scope(&self) -> ScopeId {
        self.table.create_scope()
    }

    /// Cancels every subscription created under `scope`.
    ///
    /// Idempotent: the second and later calls remove nothing. Returns how
    /// many subscriptions were removed.
    pub fn dispose_scope(&self, scope: ScopeId) -> usize {
        self.table.dispose_scope(scope)
    }

    /// Enabled subscriptions for `type_code`.
    pub fn subscriber_count(&self, type_code: TypeCode) -> usize {
        self.table.subscriber_count(type_code)
    }

    // ---------------------------
    // Publish
    // ---------------------------

    /// Publishes one message and waits until every subscriber has been
    /// attempted (including retries).
    ///
    /// ### Errors
    /// - [`PublishError::NotRegistered`] — the type code has no entry.
    /// - [`PublishError::CircuitOpen`] — the breaker is open; nothing was
    ///   delivered, and the error carries the remaining wait.
    ///
    /// Per-subscriber failures are **not** errors; see the receipt.
    pub async fn publish(&self, message: Message) -> Result<PublishReceipt, PublishError> {
        self.publish_inner(message, None).await
    }

    /// Like [`MessageBus::publish`], stopping cooperatively when `cancel`
    /// fires. Started handlers are never aborted; the receipt carries
    /// `cancelled: true` and the partial counts.
    pub async fn publish_with_cancel(
        &self,
        message: Message,
        cancel: &CancellationToken,
    ) -> Result<PublishReceipt, PublishError> {
        self.publish_inner(message, Some(cancel)).await
    }

    /// Fire-and-forget variant: runs the publish on its own task and
    /// returns the join handle.
    pub fn spawn_publish(
        self: &Arc<Self>,
        message: Message,
        cancel: CancellationToken,
    ) -> JoinHandle<Result<PublishReceipt, PublishError>> {
        let bus = Arc::clone(self);
        tokio::spawn(async move { bus.publish_with_cancel(message, &cancel).await })
    }

    /// Publishes each message independently, in order. No atomicity: one
    /// rejected message does not affect the others.
    pub async fn publish_batch(
        &self,
        messages: Vec<Message>,
    ) -> Vec<Result<PublishReceipt, PublishError>> {
        let mut results = Vec::with_capacity(messages.len());
        for message in messages {
            results.push(self.publish(message).await);
        }
        results
    }

    async fn publish_inner(
        &self,
        message: Message,
        cancel: Option<&CancellationToken>,
    ) -> Result<PublishReceipt, PublishError> {
        let code = message.type_code();

        let type_name = match self.registry.lookup(code) {
            Ok(name) => name,
            Err(err) => {
                self.log.warn(
                    "publish",
                    &format!("publish refused: type {code} is not registered"),
                    message.correlation_id(),
                );
                return Err(err);
            }
        };

        if let Err(err) = self.breakers.admit(code) {
            self.stats.record_rejected();
            self.metrics.counter("bus_rejected_total", 1);
            self.log.warn(
                "publish",
                &format!("publish rejected: {err}"),
                message.correlation_id(),
            );
            return Err(err);
        }

        self.stats.record_published(code);
        self.metrics.counter("bus_published_total", 1);

        let subscribers = self.table.snapshot(code);
        let mut receipt = PublishReceipt::new(message.id(), code, subscribers.len());

        if subscribers.is_empty() {
            self.log.debug(
                "publish",
                &format!("no subscribers for type {code} ({type_name})"),
                message.correlation_id(),
            );
            return Ok(receipt);
        }

        let retry = self
            .retry_overrides
            .get(&code)
            .copied()
            .unwrap_or(self.retry_default);

        for subscription in &subscribers {
            if let Some(token) = cancel {
                if token.is_cancelled() {
                    receipt.cancelled = true;
                    break;
                }
            }
            if !subscription.options.admits(&message) {
                self.stats.record_filtered();
                self.metrics.counter("bus_filtered_total", 1);
                receipt.filtered += 1;
                continue;
            }

            receipt.attempted += 1;
            let outcome = deliver_with_retry(
                DeliveryContext {
                    retry,
                    breakers: &self.breakers,
                    clock: self.clock.as_ref(),
                },
                &subscription.handler,
                &message,
                cancel,
            )
            .await;

            let retries = u64::from(outcome.attempts().saturating_sub(1));
            if retries > 0 {
                self.stats.record_retries(retries);
                self.metrics.counter("bus_retries_total", retries);
            }

            match outcome {
                DeliveryOutcome::Delivered { elapsed, .. } => {
                    receipt.delivered += 1;
                    self.stats.record_delivered(code, elapsed);
                    self.metrics.counter("bus_delivered_total", 1);
                }
                DeliveryOutcome::Exhausted { attempts, error }
                | DeliveryOutcome::Fatal { attempts, error } => {
                    receipt.failed += 1;
                    self.stats.record_failed(code);
                    self.metrics.counter("bus_failed_total", 1);
                    self.capture_dead_letter(&message, subscription.handler.name(), &error, attempts);
                }
                DeliveryOutcome::Cancelled { .. } => {
                    receipt.cancelled = true;
                    break;
                }
            }
        }

        if receipt.cancelled {
            self.log.debug(
                "publish",
                &format!(
                    "publish cancelled: {} of {} subscribers attempted",
                    receipt.attempted, receipt.subscribers
                ),
                message.correlation_id(),
            );
        }
        Ok(receipt)
    }

    fn capture_dead_letter(
        &self,
        message: &Message,
        handler: &str,
        error: &HandlerError,
        attempts: u32,
    ) {
        let failed = FailedMessage::new(
            message.clone(),
            handler,
            error.to_string(),
            attempts,
            self.clock.wall(),
        );
        if let Some(evicted) = self.dead_letters.add(failed) {
            self.stats.record_evicted();
            self.metrics.counter("bus_dead_letter_evicted_total", 1);
            self.log.warn(
                "dead_letter",
                &format!(
                    "dead letter evicted to admit a newer one: type {} id {}",
                    evicted.message().type_code(),
                    evicted.message().id()
                ),
                None,
            );
        }
        self.stats.record_dead_lettered(message.type_code());
        self.metrics.counter("bus_dead_lettered_total", 1);
        self.log.warn(
            "dead_letter",
            &format!(
                "delivery to {handler} failed after {attempts} attempt(s), dead-lettered: {error}"
            ),
            message.correlation_id(),
        );
    }

    // ---------------------------
    // Breakers
    // ---------------------------

    /// Current breaker state for `code` (pure read; a timed-out `Open`
    /// breaker reports `Open` until the next publish probes it).
    pub fn breaker_state(&self, code: TypeCode) -> CircuitState {
        self.breakers.state(code)
    }

    /// Forces the breaker for `code` back to `Closed` (operator surface).
    pub fn reset_breaker(&self, code: TypeCode) {
        self.breakers.reset(code);
        self.log
            .info("breaker", &format!("breaker manually reset for type {code}"), None);
    }

    // ---------------------------
    // Dead letters
    // ---------------------------

    /// Up to `limit` dead letters for `code`, newest first.
    pub fn dead_letters(&self, code: TypeCode, limit: usize) -> Vec<FailedMessage> {
        self.dead_letters.list(code, limit)
    }

    /// Removes the dead letter for `(code, id)` and returns its message.
    ///
    /// The caller decides whether and how to resubmit; the bus never
    /// republishes on its own.
    pub fn replay_dead_letter(
        &self,
        code: TypeCode,
        id: MessageId,
    ) -> Result<Message, ReplayError> {
        let message = self.dead_letters.take(code, id)?;
        self.log.debug(
            "dead_letter",
            &format!("dead letter handed back for replay: type {code} id {id}"),
            message.correlation_id(),
        );
        Ok(message)
    }

    /// Drops all dead letters for `code`; returns how many were dropped.
    pub fn clear_dead_letters(&self, code: TypeCode) -> usize {
        self.dead_letters.clear(code)
    }

    /// Dead letters currently held for `code`.
    pub fn dead_letter_count(&self, code: TypeCode) -> usize {
        self.dead_letters.len(code)
    }

    // ---------------------------
    // Statistics & health
    // ---------------------------

    /// Point-in-time copy of the counters.
    pub fn statistics(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Evaluates the window since the previous check and returns the
    /// report; fires a transition event when the status changed.
    pub fn check_health(&self) -> HealthReport {
        let report = self.health.check();
        self.metrics.gauge("bus_error_rate", report.error_rate);
        self.metrics
            .gauge("bus_avg_delivery_seconds", report.avg_delivery.as_secs_f64());
        report
    }

    /// Status from the most recent check, without recomputing.
    pub fn health_status(&self) -> HealthStatus {
        self.health.status()
    }

    /// Spawns a periodic [`MessageBus::check_health`]-equivalent loop;
    /// runs until `token` is cancelled.
    pub fn spawn_health_loop(
        &self,
        interval: Duration,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        let monitor = Arc::clone(&self.health);
        tokio::spawn(async move { monitor.run(interval, token).await })
    }

    // ---------------------------
    // Transition callbacks
    // ---------------------------

    /// Registers a callback for breaker and health transitions.
    ///
    /// Callbacks run synchronously on the task that caused the
    /// transition; keep them short and non-blocking.
    pub fn on_transition<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(&TransitionEvent) + Send + Sync + 'static,
    {
        self.hub.subscribe(callback)
    }

    /// Removes a transition callback; `false` when already removed.
    pub fn off_transition(&self, id: CallbackId) -> bool {
        self.hub.unsubscribe(id)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::clock::ManualClock;
    use crate::message::Priority;
    use crate::policies::{BackoffPolicy, BreakerPolicy, JitterPolicy};
    use crate::subscriptions::HandlerFn;

    const ORDER_PLACED: TypeCode = 42;
    const INVOICE_SENT: TypeCode = 43;

    /// Default retries use real 100ms+ backoff; tests shrink it.
    fn quick_config() -> BusConfig {
        let mut config = BusConfig::default();
        config.retry.backoff = BackoffPolicy {
            first: Duration::from_millis(1),
            max: Duration::from_millis(2),
            factor: 2.0,
            jitter: JitterPolicy::None,
        };
        config
    }

    fn recorder(name: &'static str, seen: Arc<Mutex<Vec<String>>>) -> HandlerRef {
        HandlerFn::arc(name, move |msg: Message| {
            let seen = Arc::clone(&seen);
            async move {
                seen.lock().unwrap().push(format!("{name}:{}", msg.id()));
                Ok::<_, HandlerError>(())
            }
        })
    }

    fn always_failing(name: &'static str) -> HandlerRef {
        HandlerFn::arc(name, |_msg: Message| async {
            Err::<(), _>(HandlerError::retryable("downstream 503"))
        })
    }

    #[tokio::test]
    async fn test_publish_unregistered_type_errors() {
        let bus = MessageBus::new(BusConfig::default()).unwrap();

        let err = bus.publish(Message::new(7, "x")).await.unwrap_err();
        assert!(matches!(err, PublishError::NotRegistered { code: 7 }));

        // Not a breaker rejection; nothing was admitted either.
        let stats = bus.statistics();
        assert_eq!(stats.rejected, 0);
        assert_eq!(stats.published, 0);
    }

    #[tokio::test]
    async fn test_duplicate_type_registration_fails() {
        let bus = MessageBus::new(BusConfig::default()).unwrap();
        bus.register_type(1, "OrderPlaced").unwrap();

        assert!(matches!(
            bus.register_type(1, "Renamed"),
            Err(SetupError::DuplicateType { code: 1, .. })
        ));
        assert!(matches!(
            bus.register_type(2, "OrderPlaced"),
            Err(SetupError::DuplicateType { .. })
        ));

        // First registration wins and stays.
        assert_eq!(bus.type_name(1).as_deref(), Some("OrderPlaced"));
    }

    #[tokio::test]
    async fn test_no_subscribers_receipt() {
        let bus = MessageBus::new(BusConfig::default()).unwrap();
        bus.register_type(ORDER_PLACED, "OrderPlaced").unwrap();

        let receipt = bus.publish(Message::new(ORDER_PLACED, "x")).await.unwrap();
        assert!(receipt.no_subscribers());
        assert_eq!(receipt.delivered, 0);
        assert_eq!(bus.statistics().published, 1);
    }

    #[tokio::test]
    async fn test_delivery_order_matches_subscription_order() {
        let bus = MessageBus::new(BusConfig::default()).unwrap();
        bus.register_type(ORDER_PLACED, "OrderPlaced").unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        for name in ["first", "second", "third", "fourth"] {
            bus.subscribe(ORDER_PLACED, recorder(name, Arc::clone(&seen)));
        }

        bus.publish(Message::new(ORDER_PLACED, "x")).await.unwrap();

        let order: Vec<String> = seen
            .lock()
            .unwrap()
            .iter()
            .map(|entry| entry.split(':').next().unwrap().to_string())
            .collect();
        assert_eq!(order, ["first", "second", "third", "fourth"]);
    }

    #[tokio::test]
    async fn test_priority_floor_and_fan_out() {
        let bus = MessageBus::new(BusConfig::default()).unwrap();
        bus.register_type(ORDER_PLACED, "OrderPlaced").unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe(ORDER_PLACED, recorder("audit", Arc::clone(&seen)));
        bus.subscribe_with(
            ORDER_PLACED,
            recorder("pager", Arc::clone(&seen)),
            SubscribeOptions::new().with_min_priority(Priority::High),
        );

        let normal = bus
            .publish(Message::new(ORDER_PLACED, "order #1"))
            .await
            .unwrap();
        assert_eq!(normal.subscribers, 2);
        assert_eq!(normal.delivered, 1);
        assert_eq!(normal.filtered, 1);

        let critical = bus
            .publish(Message::new(ORDER_PLACED, "order #2").with_priority(Priority::Critical))
            .await
            .unwrap();
        assert_eq!(critical.delivered, 2);
        assert_eq!(critical.filtered, 0);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert!(seen[0].starts_with("audit:"));
        assert!(seen[1].starts_with("audit:"));
        assert!(seen[2].starts_with("pager:"));
    }

    #[tokio::test]
    async fn test_retry_exhaustion_dead_letters() {
        let bus = MessageBus::new(quick_config()).unwrap();
        bus.register_type(ORDER_PLACED, "OrderPlaced").unwrap();

        let calls = Arc::new(AtomicU32::new(0));
        let calls_in = Arc::clone(&calls);
        bus.subscribe(
            ORDER_PLACED,
            HandlerFn::arc("flaky", move |_msg: Message| {
                let calls = Arc::clone(&calls_in);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(HandlerError::retryable("downstream 503"))
                }
            }),
        );

        let receipt = bus.publish(Message::new(ORDER_PLACED, "x")).await.unwrap();
        assert_eq!(receipt.failed, 1);
        assert_eq!(receipt.delivered, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let letters = bus.dead_letters(ORDER_PLACED, 10);
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].attempts(), 3);
        assert_eq!(letters[0].handler(), "flaky");

        let stats = bus.statistics();
        assert_eq!(stats.retries, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.dead_lettered, 1);
    }

    #[tokio::test]
    async fn test_fatal_error_skips_retries() {
        let bus = MessageBus::new(quick_config()).unwrap();
        bus.register_type(ORDER_PLACED, "OrderPlaced").unwrap();

        let calls = Arc::new(AtomicU32::new(0));
        let calls_in = Arc::clone(&calls);
        bus.subscribe(
            ORDER_PLACED,
            HandlerFn::arc("poisoned", move |_msg: Message| {
                let calls = Arc::clone(&calls_in);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(HandlerError::fatal("unparseable payload"))
                }
            }),
        );

        bus.publish(Message::new(ORDER_PLACED, "x")).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let letters = bus.dead_letters(ORDER_PLACED, 10);
        assert_eq!(letters[0].attempts(), 1);
        assert_eq!(bus.statistics().retries, 0);
    }

    #[tokio::test]
    async fn test_breaker_trips_rejects_and_resets() {
        let mut config = quick_config();
        config.retry.max_attempts = 1;
        config.breaker = BreakerPolicy {
            failure_threshold: 2,
            success_threshold: 1,
            open_timeout: Duration::from_secs(30),
        };
        let bus = MessageBus::new(config).unwrap();
        bus.register_type(ORDER_PLACED, "OrderPlaced").unwrap();
        bus.subscribe(ORDER_PLACED, always_failing("flaky"));

        for _ in 0..2 {
            bus.publish(Message::new(ORDER_PLACED, "x")).await.unwrap();
        }
        assert_eq!(bus.breaker_state(ORDER_PLACED), CircuitState::Open);

        let err = bus.publish(Message::new(ORDER_PLACED, "x")).await.unwrap_err();
        match err {
            PublishError::CircuitOpen { code, retry_after } => {
                assert_eq!(code, ORDER_PLACED);
                assert!(retry_after > Duration::ZERO);
                assert!(retry_after <= Duration::from_secs(30));
            }
            other => panic!("expected CircuitOpen, got {other:?}"),
        }
        assert_eq!(bus.statistics().rejected, 1);

        // Operator override: publishes flow again immediately.
        bus.reset_breaker(ORDER_PLACED);
        assert_eq!(bus.breaker_state(ORDER_PLACED), CircuitState::Closed);
        let receipt = bus.publish(Message::new(ORDER_PLACED, "x")).await.unwrap();
        assert_eq!(receipt.failed, 1);
    }

    #[tokio::test]
    async fn test_breaker_recovers_through_half_open() {
        let mut config = quick_config();
        config.retry.max_attempts = 1;
        config.breaker = BreakerPolicy {
            failure_threshold: 2,
            success_threshold: 1,
            open_timeout: Duration::from_millis(100),
        };

        let clock = Arc::new(ManualClock::new());
        let bus = MessageBus::builder(config)
            .with_clock(Arc::clone(&clock) as Arc<dyn Clock>)
            .build()
            .unwrap();
        bus.register_type(ORDER_PLACED, "OrderPlaced").unwrap();

        let transitions = Arc::new(Mutex::new(Vec::new()));
        let transitions_in = Arc::clone(&transitions);
        bus.on_transition(move |event| {
            if let TransitionEvent::Breaker { from, to, .. } = event {
                transitions_in.lock().unwrap().push((*from, *to));
            }
        });

        let healthy = Arc::new(AtomicBool::new(false));
        let healthy_in = Arc::clone(&healthy);
        bus.subscribe(
            ORDER_PLACED,
            HandlerFn::arc("toggle", move |_msg: Message| {
                let healthy = Arc::clone(&healthy_in);
                async move {
                    if healthy.load(Ordering::SeqCst) {
                        Ok(())
                    } else {
                        Err(HandlerError::retryable("warming up"))
                    }
                }
            }),
        );

        for _ in 0..2 {
            bus.publish(Message::new(ORDER_PLACED, "x")).await.unwrap();
        }
        assert_eq!(bus.breaker_state(ORDER_PLACED), CircuitState::Open);

        clock.advance(Duration::from_millis(150));
        healthy.store(true, Ordering::SeqCst);

        let receipt = bus.publish(Message::new(ORDER_PLACED, "x")).await.unwrap();
        assert_eq!(receipt.delivered, 1);
        assert_eq!(bus.breaker_state(ORDER_PLACED), CircuitState::Closed);

        let transitions = transitions.lock().unwrap();
        assert_eq!(
            *transitions,
            vec![
                (CircuitState::Closed, CircuitState::Open),
                (CircuitState::Open, CircuitState::HalfOpen),
                (CircuitState::HalfOpen, CircuitState::Closed),
            ]
        );
    }

    #[tokio::test]
    async fn test_counter_relation_holds_under_mixed_outcomes() {
        let bus = MessageBus::new(quick_config()).unwrap();
        bus.register_type(ORDER_PLACED, "OrderPlaced").unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe(ORDER_PLACED, recorder("good", Arc::clone(&seen)));
        bus.subscribe(ORDER_PLACED, always_failing("flaky"));
        bus.subscribe_with(
            ORDER_PLACED,
            recorder("picky", Arc::clone(&seen)),
            SubscribeOptions::new().with_min_priority(Priority::High),
        );

        for n in 0..3 {
            bus.publish(Message::new(ORDER_PLACED, n)).await.unwrap();
        }

        let stats = bus.statistics();
        assert_eq!(stats.published, 3);
        assert_eq!(stats.delivered, 3);
        assert_eq!(stats.failed, 3);
        assert_eq!(stats.filtered, 3);
        assert!(stats.delivered + stats.failed + stats.filtered <= stats.published * 3);

        let per_type = &stats.per_type[&ORDER_PLACED];
        assert_eq!(per_type.published, 3);
        assert_eq!(per_type.delivered, 3);
        assert_eq!(per_type.failed, 3);
        assert_eq!(per_type.dead_lettered, 3);

        // Failures and successes balance out to 50%.
        assert!((stats.error_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_cancelled_before_fan_out() {
        let bus = MessageBus::new(BusConfig::default()).unwrap();
        bus.register_type(ORDER_PLACED, "OrderPlaced").unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe(ORDER_PLACED, recorder("a", Arc::clone(&seen)));
        bus.subscribe(ORDER_PLACED, recorder("b", Arc::clone(&seen)));

        let token = CancellationToken::new();
        token.cancel();

        let receipt = bus
            .publish_with_cancel(Message::new(ORDER_PLACED, "x"), &token)
            .await
            .unwrap();
        assert!(receipt.cancelled);
        assert_eq!(receipt.attempted, 0);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_stops_remaining_subscribers() {
        let bus = MessageBus::new(BusConfig::default()).unwrap();
        bus.register_type(ORDER_PLACED, "OrderPlaced").unwrap();

        let token = CancellationToken::new();
        let token_in = token.clone();
        bus.subscribe(
            ORDER_PLACED,
            HandlerFn::arc("canceller", move |_msg: Message| {
                let token = token_in.clone();
                async move {
                    token.cancel();
                    Ok::<_, HandlerError>(())
                }
            }),
        );
        let seen = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe(ORDER_PLACED, recorder("late", Arc::clone(&seen)));

        let receipt = bus
            .publish_with_cancel(Message::new(ORDER_PLACED, "x"), &token)
            .await
            .unwrap();
        assert!(receipt.cancelled);
        assert_eq!(receipt.subscribers, 2);
        assert_eq!(receipt.attempted, 1);
        assert_eq!(receipt.delivered, 1);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_replay_hands_message_back() {
        let bus = MessageBus::new(quick_config()).unwrap();
        bus.register_type(ORDER_PLACED, "OrderPlaced").unwrap();

        let healthy = Arc::new(AtomicBool::new(false));
        let healthy_in = Arc::clone(&healthy);
        bus.subscribe(
            ORDER_PLACED,
            HandlerFn::arc("toggle", move |_msg: Message| {
                let healthy = Arc::clone(&healthy_in);
                async move {
                    if healthy.load(Ordering::SeqCst) {
                        Ok(())
                    } else {
                        Err(HandlerError::retryable("downstream 503"))
                    }
                }
            }),
        );

        bus.publish(Message::new(ORDER_PLACED, "order #7"))
            .await
            .unwrap();
        assert_eq!(bus.dead_letter_count(ORDER_PLACED), 1);

        let id = bus.dead_letters(ORDER_PLACED, 1)[0].message().id();
        let replayed = bus.replay_dead_letter(ORDER_PLACED, id).unwrap();
        assert_eq!(replayed.id(), id);
        assert_eq!(replayed.payload_as::<&str>().copied(), Some("order #7"));

        // Replay removes the entry but does not republish by itself.
        assert_eq!(bus.dead_letter_count(ORDER_PLACED), 0);
        assert!(matches!(
            bus.replay_dead_letter(ORDER_PLACED, id),
            Err(ReplayError::NotFound { .. })
        ));
        assert_eq!(bus.statistics().published, 1);

        // The caller resubmits once the handler is fixed.
        healthy.store(true, Ordering::SeqCst);
        let receipt = bus.publish(replayed).await.unwrap();
        assert_eq!(receipt.delivered, 1);
    }

    #[tokio::test]
    async fn test_dispose_scope_removes_and_stays_disposed() {
        let bus = MessageBus::new(BusConfig::default()).unwrap();
        bus.register_type(ORDER_PLACED, "OrderPlaced").unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let scope = bus.create_scope();
        bus.subscribe_in_scope(
            scope,
            ORDER_PLACED,
            recorder("a", Arc::clone(&seen)),
            SubscribeOptions::new(),
        )
        .unwrap();
        bus.subscribe_in_scope(
            scope,
            INVOICE_SENT,
            recorder("b", Arc::clone(&seen)),
            SubscribeOptions::new(),
        )
        .unwrap();

        assert_eq!(bus.dispose_scope(scope), 2);
        assert_eq!(bus.dispose_scope(scope), 0);
        assert_eq!(bus.subscriber_count(ORDER_PLACED), 0);
        assert_eq!(bus.subscriber_count(INVOICE_SENT), 0);

        assert!(matches!(
            bus.subscribe_in_scope(
                scope,
                ORDER_PLACED,
                recorder("c", Arc::clone(&seen)),
                SubscribeOptions::new(),
            ),
            Err(SetupError::ScopeDisposed { .. })
        ));
    }

    #[tokio::test]
    async fn test_set_enabled_pauses_and_resumes() {
        let bus = MessageBus::new(BusConfig::default()).unwrap();
        bus.register_type(ORDER_PLACED, "OrderPlaced").unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let handle = bus.subscribe(ORDER_PLACED, recorder("a", Arc::clone(&seen)));

        assert!(bus.set_enabled(handle, false));
        let paused = bus.publish(Message::new(ORDER_PLACED, "x")).await.unwrap();
        assert!(paused.no_subscribers());

        assert!(bus.set_enabled(handle, true));
        let resumed = bus.publish(Message::new(ORDER_PLACED, "y")).await.unwrap();
        assert_eq!(resumed.delivered, 1);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_publish_batch_results_are_independent() {
        let bus = MessageBus::new(BusConfig::default()).unwrap();
        bus.register_type(ORDER_PLACED, "OrderPlaced").unwrap();

        let results = bus
            .publish_batch(vec![
                Message::new(ORDER_PLACED, "ok"),
                Message::new(99, "unregistered"),
            ])
            .await;

        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(
            results[1],
            Err(PublishError::NotRegistered { code: 99 })
        ));
    }

    #[tokio::test]
    async fn test_spawn_publish_runs_to_completion() {
        let bus = MessageBus::new(BusConfig::default()).unwrap();
        bus.register_type(ORDER_PLACED, "OrderPlaced").unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe(ORDER_PLACED, recorder("a", Arc::clone(&seen)));

        let handle = bus.spawn_publish(Message::new(ORDER_PLACED, "x"), CancellationToken::new());
        let receipt = handle.await.unwrap().unwrap();
        assert_eq!(receipt.delivered, 1);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }
}
