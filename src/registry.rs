//! # Type registry: maps type codes to routing metadata.
//!
//! The registry is an owned, injected instance (no process-wide static
//! table): the bus constructs one and registration happens through the
//! bus surface at startup. After startup it is read-heavy — every publish
//! performs one lookup — so reads go through a plain `RwLock` that is
//! only write-locked during registration and never held across `.await`.
//!
//! ## Rules
//! - One registration per code **and** per name; any conflict is a
//!   [`SetupError::DuplicateType`].
//! - Lookup misses are a [`PublishError::NotRegistered`] — recoverable,
//!   the caller may register and re-publish.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::{PublishError, SetupError};
use crate::message::TypeCode;

/// Registry of known message types.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    by_code: HashMap<TypeCode, Arc<str>>,
    by_name: HashMap<Arc<str>, TypeCode>,
}

impl TypeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `code` under `name`.
    ///
    /// Fails with [`SetupError::DuplicateType`] if the code or the name
    /// already maps to an entry (including an identical re-registration —
    /// registration is one-shot per type).
    pub fn register(&self, code: TypeCode, name: impl Into<Arc<str>>) -> Result<(), SetupError> {
        let name: Arc<str> = name.into();
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());

        if inner.by_code.contains_key(&code) || inner.by_name.contains_key(&name) {
            return Err(SetupError::DuplicateType {
                code,
                name: name.to_string(),
            });
        }

        inner.by_code.insert(code, Arc::clone(&name));
        inner.by_name.insert(name, code);
        Ok(())
    }

    /// Returns the registered name for `code`.
    pub fn lookup(&self, code: TypeCode) -> Result<Arc<str>, PublishError> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner
            .by_code
            .get(&code)
            .cloned()
            .ok_or(PublishError::NotRegistered { code })
    }

    /// Returns the code registered under `name`, if any.
    pub fn code_of(&self, name: &str) -> Option<TypeCode> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.by_name.get(name).copied()
    }

    /// Returns true if `code` is registered.
    pub fn contains(&self, code: TypeCode) -> bool {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.by_code.contains_key(&code)
    }

    /// Returns the number of registered types.
    pub fn len(&self) -> usize {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.by_code.len()
    }

    /// Returns true if no types are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns all registrations sorted by code, for diagnostics.
    pub fn entries(&self) -> Vec<(TypeCode, Arc<str>)> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let mut entries: Vec<(TypeCode, Arc<str>)> = inner
            .by_code
            .iter()
            .map(|(code, name)| (*code, Arc::clone(name)))
            .collect();
        entries.sort_unstable_by_key(|(code, _)| *code);
        entries
    }
}
