//! # Snapshot Store
//!
//! Holds the last known good mapping of item name to value.
//!
//! The store keeps the current snapshot behind an `Arc`. Readers clone the
//! `Arc` and keep a consistent view for as long as they like; the writer
//! builds a complete new snapshot and swaps the pointer. A snapshot is never
//! mutated once it has been published, so a reader can not observe a
//! half-applied refresh.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

/// # Snapshot
///
/// Complete mapping of tracked items to their numeric values. Every value is
/// finite; rows that do not parse never make it in here. Keys are kept
/// sorted so the wire encoding is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot(BTreeMap<String, f64>);

impl Snapshot {
    /// Creates an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of `name`, if tracked.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    /// Whether `name` is tracked.
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Inserts or overwrites one item. Non-finite values are refused and
    /// `false` is returned.
    pub fn insert(&mut self, name: impl Into<String>, value: f64) -> bool {
        if !value.is_finite() {
            return false;
        }
        self.0.insert(name.into(), value);
        true
    }

    /// Removes one item, returning its value.
    pub fn remove(&mut self, name: &str) -> Option<f64> {
        self.0.remove(name)
    }

    /// Number of tracked items.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// `true` when nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates items in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.0.iter().map(|(name, value)| (name.as_str(), *value))
    }
}

impl FromIterator<(String, f64)> for Snapshot {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        let mut snapshot = Snapshot::new();
        for (name, value) in iter {
            snapshot.insert(name, value);
        }
        snapshot
    }
}

/// # Snapshot Store
///
/// Owner of the single current `Snapshot`. Starts out empty.
///
/// Only the crate can replace the value (the `Hub` is the one writer);
/// everybody else gets read-only `Arc` views through `current`.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    current: RwLock<Arc<Snapshot>>,
}

impl SnapshotStore {
    /// Creates a store holding an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read-only view of the current snapshot.
    pub fn current(&self) -> Arc<Snapshot> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Swaps in `next` and hands back the snapshot it displaced.
    pub(crate) fn replace(&self, next: Snapshot) -> Arc<Snapshot> {
        let next = Arc::new(next);
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(items: &[(&str, f64)]) -> Snapshot {
        items.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn store_starts_empty() {
        let store = SnapshotStore::new();
        assert!(store.current().is_empty());
    }

    #[test]
    fn replace_keeps_old_views_intact() {
        let store = SnapshotStore::new();
        store.replace(snap(&[("A", 1.0)]));
        let before = store.current();

        let displaced = store.replace(snap(&[("A", 2.0), ("B", 3.0)]));

        assert_eq!(before.get("A"), Some(1.0));
        assert_eq!(displaced.get("A"), Some(1.0));
        assert_eq!(store.current().get("A"), Some(2.0));
        assert_eq!(store.current().len(), 2);
    }

    #[test]
    fn non_finite_values_are_refused() {
        let mut snapshot = Snapshot::new();
        assert!(!snapshot.insert("nan", f64::NAN));
        assert!(!snapshot.insert("inf", f64::INFINITY));
        assert!(snapshot.insert("ok", -0.5));
        assert_eq!(snapshot.len(), 1);
    }

    #[test]
    fn serializes_as_plain_object() {
        let json = serde_json::to_value(snap(&[("B", 2.5), ("A", 1.0)])).unwrap();
        assert_eq!(json, serde_json::json!({"A": 1.0, "B": 2.5}));
    }
}
