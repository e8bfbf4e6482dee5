//! # Publish receipts.
//!
//! A [`PublishReceipt`] is what a successful `publish` returns: the
//! per-subscriber outcome counts for **this** message. Per-subscriber
//! failures are not publish errors; they show up here and in the
//! statistics, never as an `Err` to the publisher.

use crate::message::{MessageId, TypeCode};

/// Outcome summary for one published message.
///
/// ### Notes
/// - `subscribers` is the snapshot size at publish time; `attempted`
///   can be smaller when filters skipped entries or cancellation stopped
///   the fan-out early.
/// - `cancelled` means the fan-out stopped cooperatively; the counts
///   cover what happened before the stop. Cancellation is not an error.
#[derive(Clone, Copy, Debug)]
pub struct PublishReceipt {
    /// Id of the published message.
    pub message_id: MessageId,
    /// Type code of the published message.
    pub type_code: TypeCode,
    /// Subscribers in the fan-out snapshot.
    pub subscribers: usize,
    /// Subscribers whose delivery was started.
    pub attempted: usize,
    /// Subscribers that processed the message successfully.
    pub delivered: usize,
    /// Subscribers that exhausted retries or failed fatally.
    pub failed: usize,
    /// Subscribers skipped by a filter or priority floor.
    pub filtered: usize,
    /// Whether the fan-out was stopped by cancellation.
    pub cancelled: bool,
}

impl PublishReceipt {
    pub(crate) fn new(message_id: MessageId, type_code: TypeCode, subscribers: usize) -> Self {
        Self {
            message_id,
            type_code,
            subscribers,
            attempted: 0,
            delivered: 0,
            failed: 0,
            filtered: 0,
            cancelled: false,
        }
    }

    /// True when nobody was subscribed to this type at publish time.
    ///
    /// Informational, not an error: the message was admitted and simply
    /// had no audience.
    #[inline]
    pub fn no_subscribers(&self) -> bool {
        self.subscribers == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;

    #[test]
    fn test_no_subscribers_flag() {
        let msg = Message::new(1, ());
        let empty = PublishReceipt::new(msg.id(), 1, 0);
        assert!(empty.no_subscribers());

        let some = PublishReceipt::new(msg.id(), 1, 2);
        assert!(!some.no_subscribers());
        assert_eq!(some.delivered, 0);
        assert!(!some.cancelled);
    }
}
