//! # Health aggregation.
//!
//! The [`HealthMonitor`] folds delivery statistics into a three-level
//! status. Every check evaluates the **window since the previous check**,
//! so one bad minute does not poison the status forever.
//!
//! ## Evaluation
//! ```text
//! check()
//!   ├─ error rate  = failed / (failed + delivered)   over the window
//!   ├─ latency     = mean successful delivery time   over the window
//!   ├─ orphans     = types published in the window with zero subscribers
//!   │
//!   ├─ rate > unhealthy_error_rate          ──► Unhealthy
//!   ├─ rate > degraded_error_rate
//!   │   or latency > degraded_latency
//!   │   or any orphaned type               ──► Degraded
//!   └─ otherwise                           ──► Healthy
//! ```
//!
//! A transition event fires **only** when the status differs from the
//! previous check; repeated identical evaluations are silent.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use tokio_util::sync::CancellationToken;

use crate::clock::Clock;
use crate::error::SetupError;
use crate::message::TypeCode;
use crate::observe::{LogSink, TransitionEvent, TransitionHub};
use crate::stats::BusStatistics;
use crate::subscriptions::SubscriptionTable;

/// Aggregated bus health.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum HealthStatus {
    /// Error rate and latency are within thresholds.
    #[default]
    Healthy,
    /// Elevated error rate, slow deliveries, or an orphaned publisher.
    Degraded,
    /// The majority of deliveries are failing.
    Unhealthy,
}

impl HealthStatus {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Status band boundaries.
#[derive(Clone, Copy, Debug)]
pub struct HealthThresholds {
    /// Window error rate above this is `Unhealthy` (default `0.5`).
    pub unhealthy_error_rate: f64,
    /// Window error rate above this is at least `Degraded` (default `0.1`).
    pub degraded_error_rate: f64,
    /// Mean window delivery latency above this is at least `Degraded`
    /// (default `1s`).
    pub degraded_latency: Duration,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            unhealthy_error_rate: 0.5,
            degraded_error_rate: 0.1,
            degraded_latency: Duration::from_secs(1),
        }
    }
}

impl HealthThresholds {
    /// Validates the band boundaries; called when the bus is built.
    pub fn validate(&self) -> Result<(), SetupError> {
        for (name, rate) in [
            ("unhealthy_error_rate", self.unhealthy_error_rate),
            ("degraded_error_rate", self.degraded_error_rate),
        ] {
            if !rate.is_finite() || !(0.0..=1.0).contains(&rate) {
                return Err(SetupError::InvalidPolicy {
                    reason: format!("health {name} must be within [0, 1] (got {rate})"),
                });
            }
        }
        if self.degraded_error_rate > self.unhealthy_error_rate {
            return Err(SetupError::InvalidPolicy {
                reason: "health degraded_error_rate must not exceed unhealthy_error_rate"
                    .into(),
            });
        }
        if self.degraded_latency.is_zero() {
            return Err(SetupError::InvalidPolicy {
                reason: "health degraded_latency must be > 0".into(),
            });
        }
        Ok(())
    }
}

/// Outcome of one health check.
#[derive(Clone, Debug)]
pub struct HealthReport {
    /// Derived status.
    pub status: HealthStatus,
    /// Failed fraction of attempted deliveries in the window.
    pub error_rate: f64,
    /// Mean successful-delivery latency in the window.
    pub avg_delivery: Duration,
    /// Messages admitted in the window.
    pub published: u64,
    /// Successful deliveries in the window.
    pub delivered: u64,
    /// Exhausted/fatal deliveries in the window.
    pub failed: u64,
    /// Types published in the window that had zero enabled subscribers,
    /// sorted by code.
    pub orphaned_types: Vec<TypeCode>,
    /// When the check ran.
    pub checked_at: SystemTime,
}

/// Cumulative readings at the end of the previous window.
struct WindowState {
    status: HealthStatus,
    published: u64,
    delivered: u64,
    failed: u64,
    delivery_nanos: u64,
    delivery_samples: u64,
    per_type_published: HashMap<TypeCode, u64>,
}

/// Derives [`HealthStatus`] from the live statistics.
pub(crate) struct HealthMonitor {
    thresholds: HealthThresholds,
    stats: Arc<BusStatistics>,
    table: Arc<SubscriptionTable>,
    hub: Arc<TransitionHub>,
    clock: Arc<dyn Clock>,
    log: Arc<dyn LogSink>,
    window: Mutex<WindowState>,
}

impl HealthMonitor {
    pub(crate) fn new(
        thresholds: HealthThresholds,
        stats: Arc<BusStatistics>,
        table: Arc<SubscriptionTable>,
        hub: Arc<TransitionHub>,
        clock: Arc<dyn Clock>,
        log: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            thresholds,
            stats,
            table,
            hub,
            clock,
            log,
            window: Mutex::new(WindowState {
                status: HealthStatus::Healthy,
                published: 0,
                delivered: 0,
                failed: 0,
                delivery_nanos: 0,
                delivery_samples: 0,
                per_type_published: HashMap::new(),
            }),
        }
    }

    /// Status from the most recent check, without recomputing.
    pub(crate) fn status(&self) -> HealthStatus {
        self.window.lock().unwrap_or_else(|e| e.into_inner()).status
    }

    /// Evaluates the window since the previous check and advances it.
    pub(crate) fn check(&self) -> HealthReport {
        let snap = self.stats.snapshot();
        let (nanos, samples) = self.stats.latency_totals();

        let (report, transition) = {
            let mut window = self.window.lock().unwrap_or_else(|e| e.into_inner());

            let published = snap.published.saturating_sub(window.published);
            let delivered = snap.delivered.saturating_sub(window.delivered);
            let failed = snap.failed.saturating_sub(window.failed);

            let attempted = delivered + failed;
            let error_rate = if attempted == 0 {
                0.0
            } else {
                failed as f64 / attempted as f64
            };

            let window_samples = samples.saturating_sub(window.delivery_samples);
            let avg_delivery = if window_samples == 0 {
                Duration::ZERO
            } else {
                let window_nanos = nanos.saturating_sub(window.delivery_nanos);
                Duration::from_nanos(window_nanos / window_samples)
            };

            let mut orphaned_types: Vec<TypeCode> = snap
                .per_type
                .iter()
                .filter(|(code, counts)| {
                    let previous = window.per_type_published.get(*code).copied().unwrap_or(0);
                    counts.published > previous && self.table.subscriber_count(**code) == 0
                })
                .map(|(code, _)| *code)
                .collect();
            orphaned_types.sort_unstable();

            let status = if error_rate > self.thresholds.unhealthy_error_rate {
                HealthStatus::Unhealthy
            } else if error_rate > self.thresholds.degraded_error_rate
                || avg_delivery > self.thresholds.degraded_latency
                || !orphaned_types.is_empty()
            {
                HealthStatus::Degraded
            } else {
                HealthStatus::Healthy
            };

            let checked_at = self.clock.wall();
            let transition = (status != window.status).then(|| TransitionEvent::Health {
                from: window.status,
                to: status,
                error_rate,
                at: checked_at,
            });

            window.status = status;
            window.published = snap.published;
            window.delivered = snap.delivered;
            window.failed = snap.failed;
            window.delivery_nanos = nanos;
            window.delivery_samples = samples;
            window.per_type_published = snap
                .per_type
                .iter()
                .map(|(code, counts)| (*code, counts.published))
                .collect();

            (
                HealthReport {
                    status,
                    error_rate,
                    avg_delivery,
                    published,
                    delivered,
                    failed,
                    orphaned_types,
                    checked_at,
                },
                transition,
            )
        };

        if let Some(event) = transition {
            if let TransitionEvent::Health { from, to, .. } = &event {
                let line = format!(
                    "bus health changed: {from} -> {to} (window error rate {:.1}%)",
                    report.error_rate * 100.0
                );
                match to {
                    HealthStatus::Healthy => self.log.info("health", &line, None),
                    HealthStatus::Degraded => self.log.warn("health", &line, None),
                    HealthStatus::Unhealthy => self.log.error("health", &line, None),
                }
            }
            self.hub.notify(&event);
        }
        report
    }

    /// Periodic check loop; runs until `token` is cancelled.
    pub(crate) async fn run(&self, interval: Duration, token: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // interval fires immediately once; consume that tick.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    self.check();
                }
            }
        }
    }
}
