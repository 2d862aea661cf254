//! Hash index implementation.

use crate::index::key::{key_in_range, range_is_empty, IndexKey};
use crate::index::traits::{retain_records, Index};
use crate::schema::IndexDefinition;
use kestrel_storage::Rid;
use std::collections::{BTreeSet, HashMap};
use std::ops::Bound;

/// Hash-based index for O(1) equality lookups.
///
/// `HashIndex` is optimized for exact-match queries. Range scans are
/// supported with the same semantics as [`super::BTreeIndex`], but filter
/// and sort the whole table at scan time.
///
/// # Use Cases
///
/// - Lookup by unique identifier
/// - Link lookups
/// - Equality filters
#[derive(Debug)]
pub struct HashIndex {
    /// Index definition.
    definition: IndexDefinition,
    /// Key to record ids mapping.
    entries: HashMap<IndexKey, BTreeSet<Rid>>,
    /// Total entry count.
    count: usize,
}

impl HashIndex {
    /// Creates a new hash index.
    pub fn new(definition: IndexDefinition) -> Self {
        Self {
            definition,
            entries: HashMap::new(),
            count: 0,
        }
    }
}

impl Index for HashIndex {
    fn definition(&self) -> &IndexDefinition {
        &self.definition
    }

    fn insert_validated(&mut self, key: IndexKey, rid: Rid) {
        if self.entries.entry(key).or_default().insert(rid) {
            self.count += 1;
        }
    }

    fn remove(&mut self, key: &IndexKey, rid: Rid) -> bool {
        if let Some(set) = self.entries.get_mut(key) {
            if set.remove(&rid) {
                self.count -= 1;
                if set.is_empty() {
                    self.entries.remove(key);
                }
                return true;
            }
        }
        false
    }

    fn lookup(&self, key: &IndexKey) -> Vec<Rid> {
        self.entries
            .get(key)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    fn range(&self, from: Bound<&IndexKey>, to: Bound<&IndexKey>) -> Vec<(IndexKey, Rid)> {
        if range_is_empty(from, to) {
            return Vec::new();
        }
        let mut keys: Vec<&IndexKey> = self
            .entries
            .keys()
            .filter(|key| key_in_range(key, from, to))
            .collect();
        keys.sort();
        keys.into_iter()
            .flat_map(|key| self.entries[key].iter().map(move |rid| (key.clone(), *rid)))
            .collect()
    }

    fn remove_records(&mut self, doomed: &dyn Fn(Rid) -> bool) -> usize {
        let removed = retain_records(self.entries.values_mut(), doomed);
        self.entries.retain(|_, set| !set.is_empty());
        self.count -= removed;
        removed
    }

    fn len(&self) -> usize {
        self.count
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.count = 0;
    }
}
