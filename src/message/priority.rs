//! # Message priority levels.
//!
//! [`Priority`] orders messages by urgency: `Low < Normal < High < Critical`.
//! Subscriptions may set a minimum priority; messages below it are
//! filtered out (counted as filtered, not failed).

use std::fmt;

/// Urgency level carried by every [`Message`](crate::Message).
///
/// The ordering is total and derives directly from the declaration order,
/// so comparisons like `msg.priority() >= Priority::High` express
/// minimum-priority thresholds.
///
/// # Example
/// ```
/// use busbar::Priority;
///
/// assert!(Priority::Critical > Priority::High);
/// assert!(Priority::Low < Priority::Normal);
/// assert_eq!(Priority::default(), Priority::Normal);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Priority {
    /// Background traffic; safe to deprioritize.
    Low,
    /// Ordinary traffic (default).
    #[default]
    Normal,
    /// Elevated urgency.
    High,
    /// Highest urgency; never filtered by a minimum-priority threshold.
    Critical,
}

impl Priority {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_is_total() {
        let mut levels = [
            Priority::Critical,
            Priority::Low,
            Priority::High,
            Priority::Normal,
        ];
        levels.sort();
        assert_eq!(
            levels,
            [
                Priority::Low,
                Priority::Normal,
                Priority::High,
                Priority::Critical
            ]
        );
    }

    #[test]
    fn test_labels() {
        assert_eq!(Priority::Critical.as_label(), "critical");
        assert_eq!(Priority::Normal.to_string(), "normal");
    }
}
