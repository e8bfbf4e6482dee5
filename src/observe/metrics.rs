//! # Metrics seam.
//!
//! [`MetricsSink`] is the export point for counters and gauges. The bus
//! keeps its own atomic statistics (see [`crate::StatsSnapshot`]); a sink
//! is only consulted in addition, so wiring one up (Prometheus, OTEL, …)
//! never changes bus behavior. [`NoopMetrics`] is the default.

/// Counter/gauge export consumed by the bus.
///
/// Names are static and stable (`bus_published_total`,
/// `bus_dead_lettered_total`, `bus_error_rate`, …); implementations may
/// map them to whatever backend they like.
pub trait MetricsSink: Send + Sync {
    /// Adds `delta` to the named monotonic counter.
    fn counter(&self, name: &'static str, delta: u64);
    /// Records the current value of the named gauge.
    fn gauge(&self, name: &'static str, value: f64);
}

/// Discards every sample.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn counter(&self, _name: &'static str, _delta: u64) {}
    fn gauge(&self, _name: &'static str, _value: f64) {}
}
