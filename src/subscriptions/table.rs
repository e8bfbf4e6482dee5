//! # Subscription table - ordered, scoped subscriber storage.
//!
//! The table owns every live subscription, grouped by message type, and
//! answers one hot-path question: "who gets this message, in what order?"
//!
//! ## Architecture
//! ```text
//! subscribe(type, handler)            ┌──────────────────────────────┐
//! subscribe_in_scope(scope, ...)  ──► │ by_type: type → [entries]    │
//! unsubscribe(handle)                 │ scopes:  scope → state       │
//! dispose_scope(scope)               └──────────────┬───────────────┘
//!                                                    │
//! snapshot(type) ◄── clones enabled entries ─────────┘
//!                    (publish iterates the clone, never the table)
//! ```
//!
//! ## Rules
//! - Entries for a type keep **insertion order**; that order is the
//!   delivery order and the only ordering guarantee.
//! - `snapshot` copies out on read, so handlers may subscribe or
//!   unsubscribe mid-delivery without corrupting in-flight iteration.
//! - Unsubscribe and scope disposal are idempotent.
//! - A disposed scope stays disposed; subscribing into it is a
//!   [`SetupError::ScopeDisposed`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use crate::error::SetupError;
use crate::message::TypeCode;
use crate::subscriptions::{HandlerRef, ScopeId, SubscribeOptions, SubscriptionHandle};

/// One stored subscription.
struct Entry {
    handle: SubscriptionHandle,
    scope: Option<ScopeId>,
    handler: HandlerRef,
    options: SubscribeOptions,
    enabled: bool,
}

/// Scope bookkeeping: which handles it owns, and whether it still accepts
/// new subscriptions.
struct ScopeState {
    active: bool,
    handles: Vec<SubscriptionHandle>,
}

/// Snapshot view of one subscription, handed to the delivery path.
#[derive(Clone)]
pub(crate) struct ActiveSubscription {
    pub(crate) handle: SubscriptionHandle,
    pub(crate) handler: HandlerRef,
    pub(crate) options: SubscribeOptions,
}

#[derive(Default)]
struct TableInner {
    by_type: HashMap<TypeCode, Vec<Entry>>,
    scopes: HashMap<ScopeId, ScopeState>,
}

/// Ordered, scoped storage for all live subscriptions.
pub(crate) struct SubscriptionTable {
    inner: RwLock<TableInner>,
    next_subscription: AtomicU64,
    next_scope: AtomicU64,
}

impl SubscriptionTable {
    pub(crate) fn new() -> Self {
        Self {
            inner: RwLock::new(TableInner::default()),
            next_subscription: AtomicU64::new(1),
            next_scope: AtomicU64::new(1),
        }
    }

    /// Adds an unscoped subscription.
    pub(crate) fn subscribe(
        &self,
        type_code: TypeCode,
        handler: HandlerRef,
        options: SubscribeOptions,
    ) -> SubscriptionHandle {
        let handle = self.mint_handle(type_code);
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.by_type.entry(type_code).or_default().push(Entry {
            handle,
            scope: None,
            handler,
            options,
            enabled: true,
        });
        handle
    }

    /// Adds a subscription owned by `scope`.
    ///
    /// Fails when the scope was already disposed (or never created by this
    /// table).
    pub(crate) fn subscribe_in_scope(
        &self,
        scope: ScopeId,
        type_code: TypeCode,
        handler: HandlerRef,
        options: SubscribeOptions,
    ) -> Result<SubscriptionHandle, SetupError> {
        let handle = self.mint_handle(type_code);
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());

        match inner.scopes.get_mut(&scope) {
            Some(state) if state.active => state.handles.push(handle),
            _ => {
                return Err(SetupError::ScopeDisposed {
                    scope: scope.as_u64(),
                })
            }
        }

        inner.by_type.entry(type_code).or_default().push(Entry {
            handle,
            scope: Some(scope),
            handler,
            options,
            enabled: true,
        });
        Ok(handle)
    }

    /// Removes one subscription. Returns `false` when the handle was
    /// already gone; safe to call any number of times.
    pub(crate) fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());

        let removed_scope = {
            let Some(entries) = inner.by_type.get_mut(&handle.type_code()) else {
                return false;
            };
            let Some(pos) = entries.iter().position(|e| e.handle == handle) else {
                return false;
            };
            // Vec::remove keeps the order of the remaining entries.
            entries.remove(pos).scope
        };

        if let Some(scope) = removed_scope {
            if let Some(state) = inner.scopes.get_mut(&scope) {
                state.handles.retain(|h| *h != handle);
            }
        }
        true
    }

    /// Pauses or resumes a subscription without losing its place in the
    /// delivery order. Returns `false` for unknown handles.
    pub(crate) fn set_enabled(&self, handle: SubscriptionHandle, enabled: bool) -> bool {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let Some(entries) = inner.by_type.get_mut(&handle.type_code()) else {
            return false;
        };
        match entries.iter_mut().find(|e| e.handle == handle) {
            Some(entry) => {
                entry.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Mints a fresh scope.
    pub(crate) fn create_scope(&self) -> ScopeId {
        let scope = ScopeId::new(self.next_scope.fetch_add(1, Ordering::Relaxed));
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.scopes.insert(
            scope,
            ScopeState {
                active: true,
                handles: Vec::new(),
            },
        );
        scope
    }

    /// Cancels every subscription owned by `scope` and marks it disposed.
    ///
    /// Returns the number of subscriptions removed; the second call (and
    /// any later one) removes nothing and returns zero.
    pub(crate) fn dispose_scope(&self, scope: ScopeId) -> usize {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());

        let handles = match inner.scopes.get_mut(&scope) {
            Some(state) if state.active => {
                state.active = false;
                std::mem::take(&mut state.handles)
            }
            _ => return 0,
        };

        let mut removed = 0;
        for handle in handles {
            if let Some(entries) = inner.by_type.get_mut(&handle.type_code()) {
                let before = entries.len();
                entries.retain(|e| e.handle != handle);
                removed += before - entries.len();
            }
        }
        removed
    }

    /// Whether a scope exists and still accepts subscriptions.
    pub(crate) fn scope_active(&self, scope: ScopeId) -> bool {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.scopes.get(&scope).is_some_and(|s| s.active)
    }

    /// Clones out the enabled subscriptions for `type_code`, in
    /// subscription order.
    pub(crate) fn snapshot(&self, type_code: TypeCode) -> Vec<ActiveSubscription> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        match inner.by_type.get(&type_code) {
            None => Vec::new(),
            Some(entries) => entries
                .iter()
                .filter(|e| e.enabled)
                .map(|e| ActiveSubscription {
                    handle: e.handle,
                    handler: HandlerRef::clone(&e.handler),
                    options: e.options.clone(),
                })
                .collect(),
        }
    }

    /// Number of enabled subscriptions for `type_code`.
    pub(crate) fn subscriber_count(&self, type_code: TypeCode) -> usize {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner
            .by_type
            .get(&type_code)
            .map_or(0, |entries| entries.iter().filter(|e| e.enabled).count())
    }

    fn mint_handle(&self, type_code: TypeCode) -> SubscriptionHandle {
        SubscriptionHandle::new(
            self.next_subscription.fetch_add(1, Ordering::Relaxed),
            type_code,
        )
    }
}
