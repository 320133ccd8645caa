//! Set-membership diff between two derived views of a pipeline config
//!
//! Elements are compared by identity only. An element present on both sides
//! is neither added nor removed, whatever its other fields say.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use serde::{Deserialize, Serialize};

/// Values that carry a diff identity
pub trait Identify {
    type Key: Eq + Hash;

    fn identity(&self) -> Self::Key;
}

/// Elements only present after, and elements only present before
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diff<T> {
    pub added: Vec<T>,
    pub removed: Vec<T>,
}

impl<T> Default for Diff<T> {
    fn default() -> Self {
        Self {
            added: Vec::new(),
            removed: Vec::new(),
        }
    }
}

impl<T> Diff<T> {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Diff `before` against `after` using `identity` as the key.
///
/// `added` follows `after`'s order and `removed` follows `before`'s order.
/// When one side repeats an identity, its last occurrence is the one kept.
pub fn diff<T, K, F>(before: &[T], after: &[T], identity: F) -> Diff<T>
where
    T: Clone,
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let before_keys: Vec<K> = before.iter().map(&identity).collect();
    let after_keys: Vec<K> = after.iter().map(&identity).collect();

    let before_set: HashSet<&K> = before_keys.iter().collect();
    let after_set: HashSet<&K> = after_keys.iter().collect();

    Diff {
        added: only_in(after, &after_keys, &before_set),
        removed: only_in(before, &before_keys, &after_set),
    }
}

/// Diff two sequences of [`Identify`] values
pub fn diff_by_identity<T: Identify + Clone>(before: &[T], after: &[T]) -> Diff<T> {
    diff(before, after, T::identity)
}

fn only_in<T: Clone, K: Eq + Hash>(items: &[T], keys: &[K], other: &HashSet<&K>) -> Vec<T> {
    let mut last_index: HashMap<&K, usize> = HashMap::new();
    for (i, key) in keys.iter().enumerate() {
        last_index.insert(key, i);
    }

    let mut out = Vec::new();
    for (i, (item, key)) in items.iter().zip(keys).enumerate() {
        if last_index.get(key) == Some(&i) && !other.contains(key) {
            out.push(item.clone());
        }
    }
    out
}
