//! Shared data pool
//!
//! Key/value store that carries extracted and pre-computed values between
//! steps. Backed by a DashMap so parallel flows can share one pool without
//! external locking. Writes to the same key race; the last write wins.

use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Concurrent string pool. Clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct SharedDataPool {
    inner: Arc<DashMap<String, String>>,
}

impl SharedDataPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a pool seeded with `values`
    pub fn from_map<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let pool = Self::new();
        for (k, v) in values {
            pool.set(k, v);
        }
        pool
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key).map(|v| v.value().clone())
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.inner.insert(key.into(), value.into());
    }

    pub fn remove(&self, key: &str) -> Option<String> {
        self.inner.remove(key).map(|(_, v)| v)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn clear(&self) {
        self.inner.clear();
    }

    /// Point-in-time copy, sorted by key.
    ///
    /// Each entry is individually consistent; concurrent writers may land
    /// between entries.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.inner
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}
