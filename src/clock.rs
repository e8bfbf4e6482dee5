//! # Clock abstraction for time-dependent components.
//!
//! The circuit breaker's open-state timeout and the health monitor's
//! sampling window both depend on elapsed time. Routing those reads
//! through [`Clock`] lets tests drive time explicitly with
//! [`ManualClock`] instead of sleeping.
//!
//! Retry delays are *not* routed through the clock: the coordinator
//! sleeps on `tokio::time`, and the delay math itself is pure (see
//! [`BackoffPolicy::next`](crate::BackoffPolicy::next)).

use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime};

/// Source of monotonic and wall-clock time.
pub trait Clock: Send + Sync + 'static {
    /// Returns a monotonic instant, used for elapsed-time decisions
    /// (breaker timeouts, health windows).
    fn now(&self) -> Instant;

    /// Returns wall-clock time, used for timestamps on records and events.
    fn wall(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Production clock backed by the operating system.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced clock for deterministic tests.
///
/// Starts at an arbitrary base instant; [`ManualClock::advance`] moves it
/// forward. Wall time tracks the same offset from the construction moment.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use busbar::{Clock, ManualClock};
///
/// let clock = ManualClock::new();
/// let before = clock.now();
/// clock.advance(Duration::from_secs(30));
/// assert_eq!(clock.now() - before, Duration::from_secs(30));
/// ```
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    wall_base: SystemTime,
    offset: Mutex<Duration>,
}

impl ManualClock {
    /// Creates a clock pinned to the current moment.
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            wall_base: SystemTime::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Moves the clock forward by `delta`.
    pub fn advance(&self, delta: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        *offset += delta;
    }

    fn offset(&self) -> Duration {
        *self.offset.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + self.offset()
    }

    fn wall(&self) -> SystemTime {
        self.wall_base + self.offset()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::new();
        let t0 = clock.now();

        clock.advance(Duration::from_millis(250));
        clock.advance(Duration::from_millis(750));

        assert_eq!(clock.now() - t0, Duration::from_secs(1));
    }

    #[test]
    fn test_manual_wall_tracks_offset() {
        let clock = ManualClock::new();
        let w0 = clock.wall();

        clock.advance(Duration::from_secs(5));
        let elapsed = clock.wall().duration_since(w0).unwrap();
        assert_eq!(elapsed, Duration::from_secs(5));
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
