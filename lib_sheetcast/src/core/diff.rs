//! # Diff Engine
//!
//! Computes the minimal set of changes between two snapshots.
//!
//! The comparison is a pure function: it reads both snapshots and returns a
//! fresh `ChangeSet`, with no side effects, so it is tested in isolation.
//!
//! ## Rules
//!
//! 1. A key of `new` that is missing from `old`, or whose value differs, is
//!    emitted as `Change::Changed(new value)`.
//! 2. A key of `old` that is missing from `new` is emitted as
//!    `Change::Removed`.
//! 3. Keys present in both with equal values are absent from the result.
//!
//! Equality is exact `f64` equality. Two differently formatted source cells
//! that parse to the same float therefore count as unchanged.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::snapshot::Snapshot;

/// # Change
///
/// What happened to one item. "Unchanged" is expressed by the item being
/// absent from the `ChangeSet`, which keeps removal distinct from a value
/// of zero.
///
/// On the wire a change is a JSON number, and a removal is `null`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "Option<f64>", into = "Option<f64>")]
pub enum Change {
    /// Added, or modified to this value.
    Changed(f64),
    /// No longer present in the source.
    Removed,
}

impl From<Option<f64>> for Change {
    fn from(value: Option<f64>) -> Self {
        match value {
            Some(v) => Change::Changed(v),
            None => Change::Removed,
        }
    }
}

impl From<Change> for Option<f64> {
    fn from(change: Change) -> Self {
        match change {
            Change::Changed(v) => Some(v),
            Change::Removed => None,
        }
    }
}

/// # Change Set
///
/// Item name to `Change`. An empty change set is never broadcast.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeSet(BTreeMap<String, Change>);

impl ChangeSet {
    /// Creates an empty change set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a change for `name`, replacing any earlier one.
    pub fn insert(&mut self, name: impl Into<String>, change: Change) {
        self.0.insert(name.into(), change);
    }

    /// The change recorded for `name`, if any.
    pub fn get(&self, name: &str) -> Option<Change> {
        self.0.get(name).copied()
    }

    /// Number of changed items.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// `true` when the two compared snapshots were equal.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates changes in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Change)> + '_ {
        self.0.iter().map(|(name, change)| (name.as_str(), *change))
    }

    /// Applies this change set on top of `base` and returns the result.
    ///
    /// Value updates overwrite or add keys, removals delete them. This is what
    /// a subscriber does with an update message; `diff(a, b).apply_to(a) == b`.
    pub fn apply_to(&self, base: &Snapshot) -> Snapshot {
        let mut next = base.clone();
        for (name, change) in self.iter() {
            match change {
                Change::Changed(value) => {
                    next.insert(name, value);
                }
                Change::Removed => {
                    next.remove(name);
                }
            }
        }
        next
    }
}

impl FromIterator<(String, Change)> for ChangeSet {
    fn from_iter<I: IntoIterator<Item = (String, Change)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Compares `old` against `new`.
///
/// The result is empty if and only if both snapshots are equal as mappings.
pub fn diff(old: &Snapshot, new: &Snapshot) -> ChangeSet {
    let mut changes = ChangeSet::new();

    for (name, value) in new.iter() {
        if old.get(name) != Some(value) {
            changes.insert(name, Change::Changed(value));
        }
    }

    for (name, _) in old.iter() {
        if !new.contains(name) {
            changes.insert(name, Change::Removed);
        }
    }

    changes
}
