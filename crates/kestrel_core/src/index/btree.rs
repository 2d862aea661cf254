//! BTree index implementation.

use crate::index::key::{range_is_empty, IndexKey};
use crate::index::traits::{retain_records, Index};
use crate::schema::IndexDefinition;
use kestrel_storage::Rid;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

/// BTree-based index for ordered traversal and range queries.
///
/// `BTreeIndex` supports:
/// - Equality lookups
/// - Range queries with inclusive, exclusive or open bounds
/// - Ordered iteration
///
/// # Example
///
/// ```rust
/// use kestrel_core::index::{BTreeIndex, Index, IndexKey};
/// use kestrel_core::{IndexDefinition, PropertyType};
/// use kestrel_storage::Rid;
/// use std::ops::Bound;
///
/// let def = IndexDefinition::new("Person.age", "Person").property("age", PropertyType::Integer);
/// let mut index = BTreeIndex::new(def);
/// index.insert(IndexKey::from(25i64), Rid::new(1, 0)).unwrap();
/// index.insert(IndexKey::from(40i64), Rid::new(1, 1)).unwrap();
///
/// let adults = index.range(Bound::Included(&IndexKey::from(30i64)), Bound::Unbounded);
/// assert_eq!(adults.len(), 1);
/// ```
#[derive(Debug)]
pub struct BTreeIndex {
    /// Index definition.
    definition: IndexDefinition,
    /// Ordered key to record ids mapping.
    entries: BTreeMap<IndexKey, BTreeSet<Rid>>,
    /// Total entry count.
    count: usize,
}

impl BTreeIndex {
    /// Creates a new BTree index.
    pub fn new(definition: IndexDefinition) -> Self {
        Self {
            definition,
            entries: BTreeMap::new(),
            count: 0,
        }
    }
}

impl Index for BTreeIndex {
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
        self.entries
            .range::<IndexKey, _>((from, to))
            .flat_map(|(key, rids)| rids.iter().map(move |rid| (key.clone(), *rid)))
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::schema::PropertyType;

    fn age_index() -> BTreeIndex {
        BTreeIndex::new(
            IndexDefinition::new("Person.age", "Person").property("age", PropertyType::Integer),
        )
    }

    fn key(n: i64) -> IndexKey {
        IndexKey::from(n)
    }

    fn populated() -> BTreeIndex {
        let mut index = age_index();
        for (pos, age) in [10, 20, 30, 40, 50].into_iter().enumerate() {
            index.insert(key(age), Rid::new(1, pos as i64)).unwrap();
        }
        index
    }

    #[test]
    fn insert_and_lookup() {
        let mut index = age_index();
        index.insert(key(25), Rid::new(1, 0)).unwrap();

        assert_eq!(index.lookup(&key(25)), vec![Rid::new(1, 0)]);
        assert!(index.lookup(&key(26)).is_empty());
    }

    #[test]
    fn non_unique_keeps_every_record() {
        let mut index = age_index();
        index.insert(key(25), Rid::new(1, 3)).unwrap();
        index.insert(key(25), Rid::new(1, 1)).unwrap();
        index.insert(key(25), Rid::new(1, 1)).unwrap();

        assert_eq!(index.lookup(&key(25)), vec![Rid::new(1, 1), Rid::new(1, 3)]);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn unique_rejects_second_record() {
        let mut index = BTreeIndex::new(
            IndexDefinition::new("Person.id", "Person")
                .property("id", PropertyType::Integer)
                .unique(),
        );
        index.insert(key(1), Rid::new(1, 0)).unwrap();
        index.insert(key(1), Rid::new(1, 0)).unwrap();

        let err = index.insert(key(1), Rid::new(1, 1)).unwrap_err();
        assert!(matches!(
            err,
            CoreError::DuplicateKey { existing, rejected, .. }
                if existing == Rid::new(1, 0) && rejected == Rid::new(1, 1)
        ));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn range_query() {
        let index = populated();

        let found = index.range(Bound::Included(&key(20)), Bound::Excluded(&key(40)));
        let keys: Vec<IndexKey> = found.into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![key(20), key(30)]);

        let found = index.range(Bound::Included(&key(20)), Bound::Included(&key(40)));
        assert_eq!(found.len(), 3);
    }

    #[test]
    fn open_ranges() {
        let index = populated();
        assert_eq!(index.range(Bound::Excluded(&key(30)), Bound::Unbounded).len(), 2);
        assert_eq!(index.range(Bound::Unbounded, Bound::Included(&key(30))).len(), 3);
    }

    #[test]
    fn inverted_range_is_empty() {
        let index = populated();
        assert!(index
            .range(Bound::Included(&key(40)), Bound::Included(&key(20)))
            .is_empty());
        assert!(index
            .range(Bound::Excluded(&key(30)), Bound::Excluded(&key(30)))
            .is_empty());
    }

    #[test]
    fn remove_entry() {
        let mut index = age_index();
        index.insert(key(25), Rid::new(1, 0)).unwrap();
        assert_eq!(index.lookup(&key(25)), vec![Rid::new(1, 0)]);

        assert!(index.remove(&key(25), Rid::new(1, 0)));
        assert!(!index.remove(&key(25), Rid::new(1, 0)));
        assert!(index.lookup(&key(25)).is_empty());
        assert!(index.is_empty());
    }

    #[test]
    fn remove_records_by_predicate() {
        let mut index = populated();
        index.insert(key(10), Rid::new(2, 0)).unwrap();

        let removed = index.remove_records(&|rid| rid.collection_id() == 1);
        assert_eq!(removed, 5);
        assert_eq!(index.entries(), vec![(key(10), Rid::new(2, 0))]);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn text_keys() {
        let mut index = BTreeIndex::new(
            IndexDefinition::new("Person.name", "Person").property("name", PropertyType::String),
        );
        for (pos, name) in ["alice", "bob", "charlie"].into_iter().enumerate() {
            index.insert(IndexKey::from(name), Rid::new(1, pos as i64)).unwrap();
        }

        let found = index.range(
            Bound::Included(&IndexKey::from("alice")),
            Bound::Included(&IndexKey::from("bob")),
        );
        assert_eq!(found.len(), 2);
    }
}
