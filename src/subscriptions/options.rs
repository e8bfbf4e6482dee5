//! # Per-subscription delivery narrowing.
//!
//! [`SubscribeOptions`] lets one subscription skip messages it does not
//! care about without unsubscribing: a predicate filter over the full
//! message and/or a minimum priority floor. Skipped deliveries count as
//! `filtered` in the statistics, never as failures.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::message::{Message, Priority};

/// Shared predicate applied to each candidate message.
pub type FilterFn = Arc<dyn Fn(&Message) -> bool + Send + Sync>;

/// Optional narrowing applied before a handler is invoked.
///
/// ### Rules
/// - The priority floor is checked first, then the filter.
/// - A panicking filter counts as declining the message; the panic does
///   not escape the publish call.
///
/// # Example
/// ```
/// use busbar::{Message, Priority, SubscribeOptions};
///
/// let opts = SubscribeOptions::new()
///     .with_min_priority(Priority::High)
///     .with_filter(|msg: &Message| msg.source() != "replay");
///
/// let urgent = Message::new(1, ()).with_priority(Priority::Critical);
/// let routine = Message::new(1, ());
/// assert!(opts.admits(&urgent));
/// assert!(!opts.admits(&routine));
/// ```
#[derive(Clone, Default)]
pub struct SubscribeOptions {
    filter: Option<FilterFn>,
    min_priority: Option<Priority>,
}

impl SubscribeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only deliver messages for which `filter` returns `true`.
    #[must_use]
    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&Message) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// Only deliver messages at `floor` priority or above.
    #[must_use]
    pub fn with_min_priority(mut self, floor: Priority) -> Self {
        self.min_priority = Some(floor);
        self
    }

    /// The configured priority floor, if any.
    #[inline]
    pub fn min_priority(&self) -> Option<Priority> {
        self.min_priority
    }

    /// Whether a predicate filter is configured.
    #[inline]
    pub fn has_filter(&self) -> bool {
        self.filter.is_some()
    }

    /// Evaluates both narrowing rules against `message`.
    pub fn admits(&self, message: &Message) -> bool {
        if let Some(floor) = self.min_priority {
            if message.priority() < floor {
                return false;
            }
        }
        match &self.filter {
            None => true,
            Some(filter) => {
                catch_unwind(AssertUnwindSafe(|| filter(message))).unwrap_or(false)
            }
        }
    }
}

impl std::fmt::Debug for SubscribeOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscribeOptions")
            .field("min_priority", &self.min_priority)
            .field("filter", &self.filter.as_ref().map(|_| "<fn>"))
            .finish()
    }
}
