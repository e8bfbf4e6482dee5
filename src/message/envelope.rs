//! # The message envelope.
//!
//! [`Message`] is the single concrete envelope every publisher hands to
//! the bus. It is immutable once constructed; the bus clones it (cheaply,
//! all heavy fields are `Arc`) for retries and dead-letter storage but
//! never mutates it.
//!
//! ## Example
//! ```rust
//! use busbar::{Message, Priority};
//!
//! #[derive(Debug, PartialEq)]
//! struct OrderPlaced { order: u64 }
//!
//! let msg = Message::new(42, OrderPlaced { order: 7 })
//!     .with_source("checkout")
//!     .with_priority(Priority::High)
//!     .with_correlation("req-9001");
//!
//! assert_eq!(msg.type_code(), 42);
//! assert_eq!(msg.source(), "checkout");
//! assert_eq!(msg.payload_as::<OrderPlaced>().unwrap().order, 7);
//! ```

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::SystemTime;

use crate::message::Priority;

/// Stable small integer distinguishing payload schemas for routing.
pub type TypeCode = u16;

/// Opaque in-process payload value.
///
/// Payloads are shared, type-erased values; handlers that need the
/// concrete type downcast via [`Message::payload_as`].
pub type Payload = Arc<dyn Any + Send + Sync>;

/// Global sequence counter for message ids.
static MESSAGE_SEQ: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier assigned to every message at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageId(u64);

impl MessageId {
    fn next() -> Self {
        MessageId(MESSAGE_SEQ.fetch_add(1, AtomicOrdering::Relaxed))
    }

    /// Returns the raw numeric value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "msg-{}", self.0)
    }
}

/// Immutable typed message envelope.
///
/// Carries routing metadata (type code, priority) and tracing metadata
/// (id, creation time, source label, optional correlation id) around an
/// opaque payload. Construct with [`Message::new`] and the `with_*`
/// builder methods.
///
/// ### Properties
/// - **Cheap to clone**: payload, source and correlation are `Arc`s.
/// - **Publisher-owned** until handed to the bus; the bus never mutates it.
#[derive(Clone)]
pub struct Message {
    id: MessageId,
    created_at: SystemTime,
    type_code: TypeCode,
    source: Arc<str>,
    priority: Priority,
    correlation_id: Option<Arc<str>>,
    payload: Payload,
}

impl Message {
    /// Creates a message of the given type around `payload`.
    ///
    /// Defaults: priority [`Priority::Normal`], source `"unknown"`, no
    /// correlation id, creation time = now.
    pub fn new<P: Any + Send + Sync>(type_code: TypeCode, payload: P) -> Self {
        Self::from_payload(type_code, Arc::new(payload))
    }

    /// Creates a message around an already-shared payload.
    ///
    /// Useful when the same payload value is published under several type
    /// codes or re-published after a dead-letter replay inspection.
    pub fn from_payload(type_code: TypeCode, payload: Payload) -> Self {
        Self {
            id: MessageId::next(),
            created_at: SystemTime::now(),
            type_code,
            source: Arc::from("unknown"),
            priority: Priority::Normal,
            correlation_id: None,
            payload,
        }
    }

    /// Attaches a source label (free-text origin of the message).
    #[inline]
    pub fn with_source(mut self, source: impl Into<Arc<str>>) -> Self {
        self.source = source.into();
        self
    }

    /// Sets the priority level.
    #[inline]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Attaches a correlation identifier for cross-message tracing.
    #[inline]
    pub fn with_correlation(mut self, correlation: impl Into<Arc<str>>) -> Self {
        self.correlation_id = Some(correlation.into());
        self
    }

    /// Returns the process-unique message id.
    #[inline]
    pub fn id(&self) -> MessageId {
        self.id
    }

    /// Returns the creation timestamp.
    #[inline]
    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    /// Returns the routing type code.
    #[inline]
    pub fn type_code(&self) -> TypeCode {
        self.type_code
    }

    /// Returns the source label.
    #[inline]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Returns the priority level.
    #[inline]
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Returns the correlation id, if any.
    #[inline]
    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    /// Returns the type-erased payload.
    #[inline]
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Downcasts the payload to a concrete type.
    ///
    /// Returns `None` when the payload is of a different type; handlers
    /// subscribed via the type code usually know the concrete schema.
    pub fn payload_as<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("id", &self.id)
            .field("type_code", &self.type_code)
            .field("source", &self.source)
            .field("priority", &self.priority)
            .field("correlation_id", &self.correlation_id)
            .finish_non_exhaustive()
    }
}
