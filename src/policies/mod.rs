//! Reliability policies: retry, backoff, jitter, circuit breaking.
//!
//! This module groups the knobs that control **how often** a failed
//! delivery is re-attempted, **how long** to wait between attempts, and
//! **when** a message type is cut off entirely.
//!
//! ## Contents
//! - [`RetryPolicy`] attempt budget + backoff for one subscriber delivery
//! - [`BackoffPolicy`] how retry delays evolve (first / factor / max)
//! - [`JitterPolicy`] randomization strategy to avoid synchronized retries
//! - [`BreakerPolicy`] thresholds and timeout for the per-type circuit
//!   breaker
//!
//! ## Quick wiring
//! ```text
//! BusConfig { retry: RetryPolicy, breaker: BreakerPolicy, .. }
//!      ├─► delivery path uses retry.max_attempts and
//!      │   retry.backoff.next(n) between attempts
//!      └─► CircuitBreakers uses breaker thresholds to gate each type
//! ```
//!
//! ## Defaults
//! - `RetryPolicy::default()` → 3 attempts, exponential backoff.
//! - `BackoffPolicy::default()` → first=100ms, factor=2.0, max=5s, no jitter.
//! - `BreakerPolicy::default()` → open after 5 failures, close after
//!   2 half-open successes, 30s open timeout.
//!
//! Policies are validated when the bus is built; invalid values are a
//! synchronous [`SetupError`](crate::SetupError), never a delivery-time
//! surprise.

mod backoff;
mod breaker;
mod jitter;
mod retry;

pub use backoff::BackoffPolicy;
pub use breaker::BreakerPolicy;
pub use jitter::JitterPolicy;
pub use retry::RetryPolicy;
