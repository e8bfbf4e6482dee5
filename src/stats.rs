//! # Bus statistics.
//!
//! [`BusStatistics`] is the always-on counter block behind
//! `MessageBus::statistics()`. Everything on the hot path is a relaxed
//! atomic increment; the per-type map takes a lock only on first sight of
//! a new type code.
//!
//! ## Counting rules
//! - `published` counts messages the bus **admitted** (registered type,
//!   breaker closed). Gate refusals count as `rejected` instead.
//! - `delivered` / `failed` / `filtered` count per subscriber, so
//!   `delivered + failed + filtered <= published * subscriber_count`.
//! - A subscriber counts as `failed` once per message (after its retry
//!   budget), while `retries` counts every extra attempt.
//! - Delivery latency is sampled on successful deliveries only.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::message::TypeCode;

/// Per-type counter block.
#[derive(Default)]
struct TypeStats {
    published: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    dead_lettered: AtomicU64,
}

/// Live counters; cheap to update, read via [`BusStatistics::snapshot`].
pub struct BusStatistics {
    published: AtomicU64,
    rejected: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    filtered: AtomicU64,
    retries: AtomicU64,
    dead_lettered: AtomicU64,
    evicted: AtomicU64,
    delivery_nanos: AtomicU64,
    delivery_samples: AtomicU64,
    per_type: RwLock<HashMap<TypeCode, Arc<TypeStats>>>,
}

impl BusStatistics {
    pub fn new() -> Self {
        Self {
            published: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            filtered: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            dead_lettered: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
            delivery_nanos: AtomicU64::new(0),
            delivery_samples: AtomicU64::new(0),
            per_type: RwLock::new(HashMap::new()),
        }
    }

    fn type_stats(&self, code: TypeCode) -> Arc<TypeStats> {
        {
            let map = self.per_type.read().unwrap_or_else(|e| e.into_inner());
            if let Some(stats) = map.get(&code) {
                return Arc::clone(stats);
            }
        }
        let mut map = self.per_type.write().unwrap_or_else(|e| e.into_inner());
        Arc::clone(map.entry(code).or_default())
    }

    pub(crate) fn record_published(&self, code: TypeCode) {
        self.published.fetch_add(1, Ordering::Relaxed);
        self.type_stats(code).published.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delivered(&self, code: TypeCode, elapsed: Duration) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
        self.type_stats(code).delivered.fetch_add(1, Ordering::Relaxed);

        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.delivery_nanos.fetch_add(nanos, Ordering::Relaxed);
        self.delivery_samples.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self, code: TypeCode) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.type_stats(code).failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_filtered(&self) {
        self.filtered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_retries(&self, delta: u64) {
        self.retries.fetch_add(delta, Ordering::Relaxed);
    }

    pub(crate) fn record_dead_lettered(&self, code: TypeCode) {
        self.dead_lettered.fetch_add(1, Ordering::Relaxed);
        self.type_stats(code)
            .dead_lettered
            .fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_evicted(&self) {
        self.evicted.fetch_add(1, Ordering::Relaxed);
    }

    /// Raw latency sums, for window math in the health monitor.
    pub(crate) fn latency_totals(&self) -> (u64, u64) {
        (
            self.delivery_nanos.load(Ordering::Relaxed),
            self.delivery_samples.load(Ordering::Relaxed),
        )
    }

    /// Takes a point-in-time copy of every counter.
    ///
    /// Counters are read individually (relaxed), so a snapshot taken while
    /// publishes are in flight may be mid-delivery consistent; totals never
    /// decrease between snapshots.
    pub fn snapshot(&self) -> StatsSnapshot {
        let samples = self.delivery_samples.load(Ordering::Relaxed);
        let nanos = self.delivery_nanos.load(Ordering::Relaxed);
        let avg_delivery = if samples == 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos(nanos / samples)
        };

        let per_type = {
            let map = self.per_type.read().unwrap_or_else(|e| e.into_inner());
            map.iter()
                .map(|(code, stats)| {
                    (
                        *code,
                        TypeCounts {
                            published: stats.published.load(Ordering::Relaxed),
                            delivered: stats.delivered.load(Ordering::Relaxed),
                            failed: stats.failed.load(Ordering::Relaxed),
                            dead_lettered: stats.dead_lettered.load(Ordering::Relaxed),
                        },
                    )
                })
                .collect()
        };

        StatsSnapshot {
            published: self.published.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            filtered: self.filtered.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            avg_delivery,
            per_type,
        }
    }
}

impl Default for BusStatistics {
    fn default() -> Self {
        Self::new()
    }
}

/// Counters for one message type.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TypeCounts {
    pub published: u64,
    pub delivered: u64,
    pub failed: u64,
    pub dead_lettered: u64,
}

/// Point-in-time view of the bus counters.
///
/// Returned by `MessageBus::statistics()`; also the input the health
/// monitor diffs between checks.
#[derive(Clone, Debug, Default)]
pub struct StatsSnapshot {
    /// Messages admitted past the registry and breaker gates.
    pub published: u64,
    /// Publish calls refused by an open breaker.
    pub rejected: u64,
    /// Successful subscriber deliveries.
    pub delivered: u64,
    /// Subscriber deliveries that exhausted their retry budget (or hit a
    /// fatal handler error).
    pub failed: u64,
    /// Deliveries skipped by a subscription filter or priority floor.
    pub filtered: u64,
    /// Extra delivery attempts beyond each first try.
    pub retries: u64,
    /// Messages captured by the dead letter store.
    pub dead_lettered: u64,
    /// Dead letters dropped to make room for newer ones.
    pub evicted: u64,
    /// Mean latency of successful deliveries since startup.
    pub avg_delivery: Duration,
    /// Per-type breakdown, keyed by type code.
    pub per_type: HashMap<TypeCode, TypeCounts>,
}

impl StatsSnapshot {
    /// Failed deliveries as a fraction of attempted outcomes
    /// (`failed / (delivered + failed)`); `0.0` when nothing was attempted.
    pub fn error_rate(&self) -> f64 {
        let attempted = self.delivered + self.failed;
        if attempted == 0 {
            return 0.0;
        }
        self.failed as f64 / attempted as f64
    }
}
