//! # Opaque subscription and scope identifiers.
//!
//! Both tokens are minted by the bus, are `Copy`, and cannot be forged or
//! reused across buses meaningfully. [`SubscriptionHandle`] cancels one
//! subscription; [`ScopeId`] groups handles for bulk cancellation.

use std::fmt;

use crate::message::TypeCode;

/// Identifies one live subscription.
///
/// Returned by `subscribe`; pass it to `unsubscribe` or `set_enabled`.
/// The handle stays valid (and inert) after the subscription is removed:
/// unsubscribing twice is a no-op.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    id: u64,
    type_code: TypeCode,
}

impl SubscriptionHandle {
    pub(crate) fn new(id: u64, type_code: TypeCode) -> Self {
        Self { id, type_code }
    }

    /// Raw numeric id (unique per bus, also the subscription order).
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The message type this subscription listens to.
    #[inline]
    pub fn type_code(&self) -> TypeCode {
        self.type_code
    }
}

impl fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.id)
    }
}

/// Identifies one subscription scope.
///
/// Minted by `create_scope`; disposing a scope cancels every subscription
/// created under it. A disposed scope never becomes usable again.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ScopeId(u64);

impl ScopeId {
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }

    /// Raw numeric id.
    #[inline]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_display() {
        let handle = SubscriptionHandle::new(12, 7);
        assert_eq!(handle.to_string(), "sub-12");
        assert_eq!(handle.id(), 12);
        assert_eq!(handle.type_code(), 7);
    }

    #[test]
    fn test_scope_display() {
        let scope = ScopeId::new(3);
        assert_eq!(scope.to_string(), "scope-3");
        assert_eq!(scope.as_u64(), 3);
    }
}
