//! # Observability seams: logging, metrics, transition callbacks.
//!
//! Everything here is optional plumbing around the bus core:
//! - [`LogSink`] — pluggable structured logging ([`TracingLog`] by default);
//! - [`MetricsSink`] — pluggable counters/gauges ([`NoopMetrics`] by default);
//! - [`TransitionHub`] — fan-out of [`TransitionEvent`]s (breaker and
//!   health state changes) to registered callbacks.
//!
//! The bus is fully functional with the no-op implementations; none of
//! these seams sit on the successful delivery path.

mod log;
mod metrics;
mod transitions;

pub use log::{LogSink, NullLog, TracingLog};
pub use metrics::{MetricsSink, NoopMetrics};
pub use transitions::{CallbackId, TransitionEvent, TransitionHub};

#[cfg(feature = "logging")]
pub use log::LogWriter;
