//! # Correlation Store
//!
//! Maps an in-flight evaluation to the handle a hook opened for it in
//! `before`, so `after`, `error` and `finally` can find it again.
//!
//! ## Guarantees
//!
//! * Safe under any number of concurrent callers; sharded internally by
//!   [`DashMap`], callers never lock.
//! * `put` on an existing key overwrites it (last writer wins) and hands the
//!   displaced handle back to the caller.
//! * No eviction or expiry. An entry leaves only through [`CorrelationStore::remove`].
//!   If `finally` never runs for an evaluation (the process dies mid-flight)
//!   its entry stays for the life of the store.
//!
//! ## Key collisions
//!
//! With [`KeyScheme::FlagAndSubject`] two concurrent reads of the same flag
//! for the same subject share a key, and the second `put` replaces the first
//! handle. [`KeyScheme::PerEvaluation`] appends the evaluation id and removes
//! the collision.

use crate::context::HookContext;
use dashmap::DashMap;
use std::fmt;

/// Separator between flag key and subject id.
pub const KEY_SEPARATOR: &str = "_";

/// How a [`CorrelationKey`] is derived from a [`HookContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyScheme {
    /// `flagKey_subjectId`; collides for concurrent identical reads.
    #[default]
    FlagAndSubject,
    /// `flagKey_subjectId#evaluationId`; unique per call.
    PerEvaluation,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationKey(String);

impl CorrelationKey {
    pub fn new(flag_key: &str, subject_id: &str) -> Self {
        Self(format!("{}{}{}", flag_key, KEY_SEPARATOR, subject_id))
    }

    pub fn for_context(context: &HookContext, scheme: KeyScheme) -> Self {
        let key = Self::new(&context.flag_key, context.user_id());
        match scheme {
            KeyScheme::FlagAndSubject => key,
            KeyScheme::PerEvaluation => Self(format!("{}#{}", key.0, context.evaluation_id)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Concurrent key to handle map used by the stateful hooks.
pub struct CorrelationStore<V> {
    entries: DashMap<CorrelationKey, V>,
}

impl<V> CorrelationStore<V> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Stores `handle`, returning whatever was stored under `key` before.
    pub fn put(&self, key: CorrelationKey, handle: V) -> Option<V> {
        self.entries.insert(key, handle)
    }

    /// Runs `f` against the stored handle without cloning it.
    pub fn with<R>(&self, key: &CorrelationKey, f: impl FnOnce(&V) -> R) -> Option<R> {
        self.entries.get(key).map(|entry| f(entry.value()))
    }

    pub fn remove(&self, key: &CorrelationKey) -> Option<V> {
        self.entries.remove(key).map(|(_, handle)| handle)
    }

    pub fn contains(&self, key: &CorrelationKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V: Clone> CorrelationStore<V> {
    pub fn try_get(&self, key: &CorrelationKey) -> Option<V> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }
}

impl<V> Default for CorrelationStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> fmt::Debug for CorrelationStore<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CorrelationStore")
            .field("entries", &self.entries.len())
            .finish()
    }
}
