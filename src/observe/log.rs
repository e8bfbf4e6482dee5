//! # Logging seam.
//!
//! The bus never logs on the successful hot path; sinks see breaker
//! trips, retry exhaustion, dead-letter activity, and health changes.
//!
//! Provided implementations:
//! - [`TracingLog`] (default) — forwards to the `tracing` macros with the
//!   context and correlation id as structured fields;
//! - [`NullLog`] — discards everything;
//! - [`LogWriter`] (enabled via the `logging` feature) — prints to stdout,
//!   useful for demos and debugging.

/// Structured log sink consumed by the bus.
///
/// `context` names the emitting component (`"publish"`, `"breaker"`,
/// `"dead_letter"`, `"health"`, `"registry"`). `correlation` is the
/// correlation id of the message that triggered the line, when one
/// exists; implementations should surface both so log lines can be
/// grouped and joined across services.
pub trait LogSink: Send + Sync {
    /// Low-volume diagnostics (subscription changes, replay activity).
    fn debug(&self, context: &'static str, message: &str, correlation: Option<&str>);
    /// Normal operational milestones (breaker recovered, health restored).
    fn info(&self, context: &'static str, message: &str, correlation: Option<&str>);
    /// Degradation that the bus absorbed (retry exhausted, eviction).
    fn warn(&self, context: &'static str, message: &str, correlation: Option<&str>);
    /// Conditions needing operator attention (breaker open, unhealthy).
    fn error(&self, context: &'static str, message: &str, correlation: Option<&str>);
}

/// Default sink: forwards to [`tracing`] with `context` and
/// `correlation` as fields.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingLog;

impl LogSink for TracingLog {
    fn debug(&self, context: &'static str, message: &str, correlation: Option<&str>) {
        match correlation {
            Some(c) => tracing::debug!(context, correlation = c, "{message}"),
            None => tracing::debug!(context, "{message}"),
        }
    }

    fn info(&self, context: &'static str, message: &str, correlation: Option<&str>) {
        match correlation {
            Some(c) => tracing::info!(context, correlation = c, "{message}"),
            None => tracing::info!(context, "{message}"),
        }
    }

    fn warn(&self, context: &'static str, message: &str, correlation: Option<&str>) {
        match correlation {
            Some(c) => tracing::warn!(context, correlation = c, "{message}"),
            None => tracing::warn!(context, "{message}"),
        }
    }

    fn error(&self, context: &'static str, message: &str, correlation: Option<&str>) {
        match correlation {
            Some(c) => tracing::error!(context, correlation = c, "{message}"),
            None => tracing::error!(context, "{message}"),
        }
    }
}

/// Discards every line.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullLog;

impl LogSink for NullLog {
    fn debug(&self, _context: &'static str, _message: &str, _correlation: Option<&str>) {}
    fn info(&self, _context: &'static str, _message: &str, _correlation: Option<&str>) {}
    fn warn(&self, _context: &'static str, _message: &str, _correlation: Option<&str>) {}
    fn error(&self, _context: &'static str, _message: &str, _correlation: Option<&str>) {}
}

/// Base sink that prints to stdout.
///
/// Enabled via the `logging` feature. Useful for demos and debugging.
#[cfg(feature = "logging")]
#[derive(Clone, Copy, Debug, Default)]
pub struct LogWriter;

#[cfg(feature = "logging")]
impl LogWriter {
    fn line(level: &str, context: &str, message: &str, correlation: Option<&str>) {
        match correlation {
            Some(c) => println!("[{level}][{context}] correlation={c} {message}"),
            None => println!("[{level}][{context}] {message}"),
        }
    }
}

#[cfg(feature = "logging")]
impl LogSink for LogWriter {
    fn debug(&self, context: &'static str, message: &str, correlation: Option<&str>) {
        Self::line("debug", context, message, correlation);
    }

    fn info(&self, context: &'static str, message: &str, correlation: Option<&str>) {
        Self::line("info", context, message, correlation);
    }

    fn warn(&self, context: &'static str, message: &str, correlation: Option<&str>) {
        Self::line("warn", context, message, correlation);
    }

    fn error(&self, context: &'static str, message: &str, correlation: Option<&str>) {
        Self::line("error", context, message, correlation);
    }
}
