//! # busbar
//!
//! **Busbar** is a typed in-process publish/subscribe bus for Rust.
//!
//! It routes messages by numeric type code to ordered subscribers, with
//! per-subscriber retries, per-type circuit breakers, a bounded dead
//! letter store, and continuous health assessment. The crate is designed
//! as a building block for services that need reliable internal fan-out
//! without an external broker.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │  publisher   │   │  publisher   │   │  publisher   │
//!     │ (user code)  │   │ (user code)  │   │ (user code)  │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  MessageBus (orchestrator)                                        │
//! │  - TypeRegistry (code → name, collision-checked)                  │
//! │  - CircuitBreakers (per-type admission gate)                      │
//! │  - SubscriptionTable (ordered handlers, filters, scopes)          │
//! │  - DeadLetterStore (bounded, per-type queues)                     │
//! │  - BusStatistics / HealthMonitor (counters, windowed status)      │
//! └──────┬──────────────────┬──────────────────┬──────────────────────┘
//!        ▼                  ▼                  ▼
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │  delivery    │   │  delivery    │   │  delivery    │
//!     │ (retry loop) │   │ (retry loop) │   │ (retry loop) │
//!     └┬─────────────┘   └┬─────────────┘   └┬─────────────┘
//!      │                  │                  │
//!      │ attempt results feed the type's breaker; exhausted or
//!      │ fatal deliveries are captured as dead letters
//!      ▼                  ▼                  ▼
//!                 ┌────────────────────────┐
//!                 │     TransitionHub      │
//!                 │ (breaker/health events)│
//!                 └───┬────────────────┬───┘
//!                     ▼                ▼
//!              log/metrics sinks   user callbacks
//! ```
//!
//! ### Publish lifecycle
//! ```text
//! Message ──► MessageBus::publish()
//!
//! ├─► registry.lookup(type)        ─► Err(NotRegistered) if unknown
//! ├─► breaker.admit(type)          ─► Err(CircuitOpen) while cooling down
//! ├─► snapshot subscribers (insertion order, enabled only)
//! │
//! ├─► per subscriber:
//! │     ├─ filter / priority floor ─► skipped, counted as filtered
//! │     └─ attempt loop:
//! │          ├─ Ok              ─► delivered (latency sampled)
//! │          ├─ Err(retryable)  ─► backoff.next(retry), sleep, retry
//! │          ├─ Err(fatal)      ─► stop immediately
//! │          └─ panic           ─► caught, treated as fatal
//! │        exhausted / fatal    ─► dead letter {message, handler,
//! │                                 error, attempts, failed_at}
//! │
//! └─► Ok(PublishReceipt { delivered, failed, filtered, cancelled, .. })
//!
//! Breaker per type: Closed ──(failures ≥ threshold)──► Open
//!                   Open ──(open_timeout elapsed)────► HalfOpen (probe)
//!                   HalfOpen ──(successes ≥ threshold)► Closed
//!                   HalfOpen ──(any failure)──────────► Open
//! ```
//!
//! ## Features
//! | Area             | Description                                                          | Key types / traits                                    |
//! |------------------|----------------------------------------------------------------------|-------------------------------------------------------|
//! | **Messages**     | Typed envelopes with priority, source, and correlation metadata.     | [`Message`], [`Priority`], [`MessageId`]              |
//! | **Subscribing**  | Async handlers with filters, priority floors, and lifecycle scopes.  | [`Handler`], [`HandlerFn`], [`ScopeId`]               |
//! | **Policies**     | Retry budgets, backoff with jitter, breaker thresholds.              | [`RetryPolicy`], [`BackoffPolicy`], [`BreakerPolicy`] |
//! | **Dead letters** | Bounded capture of exhausted deliveries, listing and replay.         | [`FailedMessage`]                                     |
//! | **Health**       | Windowed error-rate, latency, and orphan checks.                     | [`HealthReport`], [`HealthThresholds`]                |
//! | **Observability**| Pluggable log/metrics sinks, transition callbacks, injectable clock. | [`LogSink`], [`MetricsSink`], [`Clock`]               |
//! | **Errors**       | Typed errors for setup, publishing, handling, and replay.            | [`SetupError`], [`PublishError`], [`HandlerError`]    |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] _(demo/reference only)_.
//!
//! ## Example
//! ```rust
//! use busbar::{
//!     BusConfig, HandlerError, HandlerFn, Message, MessageBus, Priority, SubscribeOptions,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bus = MessageBus::builder(BusConfig::default()).build()?;
//!
//!     bus.register_type(42, "OrderPlaced")?;
//!
//!     // Every order is audited.
//!     bus.subscribe(
//!         42,
//!         HandlerFn::arc("audit", |msg: Message| async move {
//!             println!("audit: order {}", msg.id());
//!             Ok::<_, HandlerError>(())
//!         }),
//!     );
//!
//!     // Only high-priority orders page anyone.
//!     bus.subscribe_with(
//!         42,
//!         HandlerFn::arc("pager", |msg: Message| async move {
//!             println!("paging for {}", msg.id());
//!             Ok::<_, HandlerError>(())
//!         }),
//!         SubscribeOptions::new().with_min_priority(Priority::High),
//!     );
//!
//!     let receipt = bus
//!         .publish(Message::new(42, "order #1").with_priority(Priority::Critical))
//!         .await?;
//!     assert_eq!(receipt.delivered, 2);
//!     Ok(())
//! }
//! ```
mod breakers;
mod bus;
mod clock;
mod config;
mod dead_letter;
mod error;
mod health;
mod message;
mod observe;
mod policies;
mod registry;
mod stats;
mod subscriptions;

pub use breakers::CircuitState;
pub use bus::{BusBuilder, MessageBus, PublishReceipt};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::BusConfig;
pub use dead_letter::FailedMessage;
pub use error::{HandlerError, PublishError, ReplayError, SetupError};
pub use health::{HealthReport, HealthStatus, HealthThresholds};
pub use message::{Message, MessageId, Payload, Priority, TypeCode};
pub use observe::{
    CallbackId, LogSink, MetricsSink, NoopMetrics, NullLog, TracingLog, TransitionEvent,
    TransitionHub,
};
pub use policies::{BackoffPolicy, BreakerPolicy, JitterPolicy, RetryPolicy};
pub use stats::{StatsSnapshot, TypeCounts};
pub use subscriptions::{
    FilterFn, Handler, HandlerFn, HandlerRef, ScopeId, SubscribeOptions, SubscriptionHandle,
};

#[cfg(feature = "logging")]
pub use observe::LogWriter;
