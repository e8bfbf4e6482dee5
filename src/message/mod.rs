//! Message data model: the envelope and its priority levels.
//!
//! This module groups the immutable value types a publisher hands to the
//! bus:
//! - [`Message`] the concrete envelope (id, timestamp, type code, source,
//!   priority, optional correlation id, opaque payload)
//! - [`MessageId`], [`TypeCode`] identifier types
//! - [`Priority`] the ordered urgency levels used by minimum-priority
//!   subscription filters
//!
//! There is no message trait hierarchy: every payload schema travels in
//! the same envelope, distinguished by its type code, and handlers
//! downcast the payload when they need the concrete value.

mod envelope;
mod priority;

pub use envelope::{Message, MessageId, Payload, TypeCode};
pub use priority::Priority;
