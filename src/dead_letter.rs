//! # Dead letter store.
//!
//! Messages whose delivery to a subscriber exhausted its retry budget (or
//! failed fatally) land here instead of disappearing. The store is a
//! bounded FIFO per message type: when a queue is full the **oldest**
//! entry is evicted to make room, so recent failures are always kept.
//!
//! The store itself is passive bookkeeping. Capturing, eviction counting,
//! logging, and replay are driven by the bus orchestrator.

use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;
use std::time::SystemTime;

use crate::error::ReplayError;
use crate::message::{Message, MessageId, TypeCode};

/// One captured delivery failure.
///
/// The same message can appear more than once when several subscribers
/// failed on it; each entry names the handler that gave up.
#[derive(Clone, Debug)]
pub struct FailedMessage {
    message: Message,
    handler: String,
    error: String,
    attempts: u32,
    failed_at: SystemTime,
}

impl FailedMessage {
    pub(crate) fn new(
        message: Message,
        handler: impl Into<String>,
        error: impl Into<String>,
        attempts: u32,
        failed_at: SystemTime,
    ) -> Self {
        Self {
            message,
            handler: handler.into(),
            error: error.into(),
            attempts,
            failed_at,
        }
    }

    /// The original message, unchanged.
    #[inline]
    pub fn message(&self) -> &Message {
        &self.message
    }

    /// Name of the handler that exhausted its attempts.
    #[inline]
    pub fn handler(&self) -> &str {
        &self.handler
    }

    /// The final error, rendered at capture time.
    #[inline]
    pub fn error(&self) -> &str {
        &self.error
    }

    /// How many delivery attempts were made before giving up.
    #[inline]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// When the delivery was abandoned.
    #[inline]
    pub fn failed_at(&self) -> SystemTime {
        self.failed_at
    }

    fn into_message(self) -> Message {
        self.message
    }
}

/// Bounded per-type FIFO of [`FailedMessage`]s.
pub(crate) struct DeadLetterStore {
    queues: RwLock<HashMap<TypeCode, VecDeque<FailedMessage>>>,
    capacity: usize,
}

impl DeadLetterStore {
    /// `capacity` bounds each type's queue individually.
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            queues: RwLock::new(HashMap::new()),
            capacity,
        }
    }

    /// Appends a failure; returns the evicted oldest entry when the
    /// type's queue was already full.
    pub(crate) fn add(&self, failed: FailedMessage) -> Option<FailedMessage> {
        let code = failed.message.type_code();
        let mut queues = self.queues.write().unwrap_or_else(|e| e.into_inner());
        let queue = queues.entry(code).or_default();

        let evicted = if queue.len() >= self.capacity {
            queue.pop_front()
        } else {
            None
        };
        queue.push_back(failed);
        evicted
    }

    /// Copies out up to `limit` entries for `code`, newest first.
    pub(crate) fn list(&self, code: TypeCode, limit: usize) -> Vec<FailedMessage> {
        let queues = self.queues.read().unwrap_or_else(|e| e.into_inner());
        match queues.get(&code) {
            None => Vec::new(),
            Some(queue) => queue.iter().rev().take(limit).cloned().collect(),
        }
    }

    /// Removes the oldest entry for `(code, id)` and hands back its
    /// message for republishing.
    pub(crate) fn take(&self, code: TypeCode, id: MessageId) -> Result<Message, ReplayError> {
        let mut queues = self.queues.write().unwrap_or_else(|e| e.into_inner());
        let Some(queue) = queues.get_mut(&code) else {
            return Err(ReplayError::NotFound { code, id });
        };
        let Some(pos) = queue.iter().position(|f| f.message.id() == id) else {
            return Err(ReplayError::NotFound { code, id });
        };
        let failed = queue
            .remove(pos)
            .ok_or(ReplayError::NotFound { code, id })?;
        Ok(failed.into_message())
    }

    /// Drops every entry for `code`; returns how many were dropped.
    pub(crate) fn clear(&self, code: TypeCode) -> usize {
        let mut queues = self.queues.write().unwrap_or_else(|e| e.into_inner());
        queues.remove(&code).map_or(0, |q| q.len())
    }

    /// Entries currently held for `code`.
    pub(crate) fn len(&self, code: TypeCode) -> usize {
        let queues = self.queues.read().unwrap_or_else(|e| e.into_inner());
        queues.get(&code).map_or(0, VecDeque::len)
    }
}
