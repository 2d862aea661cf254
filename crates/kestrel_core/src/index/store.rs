//! Committed index store: the shared, committed state of every index.

use crate::error::{CoreError, CoreResult};
use crate::index::btree::BTreeIndex;
use crate::index::hash::HashIndex;
use crate::index::key::IndexKey;
use crate::index::traits::Index;
use crate::schema::{IndexAlgorithm, IndexDefinition};
use kestrel_storage::Rid;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// The net changes one transaction makes to one index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexChangeSet {
    /// Index name.
    pub index: String,
    /// Whether every committed entry is dropped first.
    pub cleared: bool,
    /// Entries to add.
    pub adds: Vec<(IndexKey, Rid)>,
    /// Entries to remove.
    pub removes: Vec<(IndexKey, Rid)>,
}

impl IndexChangeSet {
    /// Returns true if applying the set would change nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.cleared && self.adds.is_empty() && self.removes.is_empty()
    }
}

/// Creates the engine selected by the definition's algorithm.
pub fn build_engine(definition: IndexDefinition) -> Box<dyn Index> {
    match definition.algorithm {
        IndexAlgorithm::BTree => Box::new(BTreeIndex::new(definition)),
        IndexAlgorithm::Hash => Box::new(HashIndex::new(definition)),
    }
}

/// Committed entries of every index, shared by all sessions.
///
/// The store itself is not synchronized; the database keeps it behind a
/// read-write lock. Transactions never touch it directly: their changes are
/// verified with [`CommittedIndexStore::verify_unique`] and merged with
/// [`CommittedIndexStore::apply`] during commit.
#[derive(Debug, Default)]
pub struct CommittedIndexStore {
    indexes: HashMap<String, Box<dyn Index>>,
}

impl CommittedIndexStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an already populated engine.
    ///
    /// # Errors
    ///
    /// Fails if an index with the same name exists.
    pub fn insert(&mut self, engine: Box<dyn Index>) -> CoreResult<()> {
        let name = engine.definition().name.clone();
        if self.indexes.contains_key(&name) {
            return Err(CoreError::invalid_operation(format!(
                "index '{name}' already exists"
            )));
        }
        self.indexes.insert(name, engine);
        Ok(())
    }

    /// Removes an index.
    ///
    /// # Errors
    ///
    /// Fails if the index does not exist.
    pub fn drop_index(&mut self, name: &str) -> CoreResult<Box<dyn Index>> {
        self.indexes
            .remove(name)
            .ok_or_else(|| CoreError::index_not_found(name))
    }

    /// Returns an index engine.
    ///
    /// # Errors
    ///
    /// Fails if the index does not exist.
    pub fn get(&self, name: &str) -> CoreResult<&dyn Index> {
        self.indexes
            .get(name)
            .map(|engine| engine.as_ref())
            .ok_or_else(|| CoreError::index_not_found(name))
    }

    /// Returns the names of every index, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.indexes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Returns true if the index exists and is unique.
    pub fn is_unique(&self, name: &str) -> bool {
        self.indexes
            .get(name)
            .is_some_and(|engine| engine.definition().is_unique())
    }

    /// Checks that applying the change sets leaves every unique key mapped
    /// to at most one record.
    ///
    /// Change sets for indexes that no longer exist are ignored.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateKey` naming the first contested key.
    pub fn verify_unique(&self, changes: &[IndexChangeSet]) -> CoreResult<()> {
        for set in changes {
            let Some(engine) = self.indexes.get(&set.index) else {
                continue;
            };
            if !engine.definition().is_unique() {
                continue;
            }

            let mut removed: BTreeMap<&IndexKey, BTreeSet<Rid>> = BTreeMap::new();
            for (key, rid) in &set.removes {
                removed.entry(key).or_default().insert(*rid);
            }
            let mut validated: BTreeMap<&IndexKey, Rid> = BTreeMap::new();

            for (key, rid) in &set.adds {
                let committed = if set.cleared {
                    Vec::new()
                } else {
                    engine.lookup(key)
                };
                let existing = committed
                    .into_iter()
                    .filter(|r| removed.get(key).map_or(true, |gone| !gone.contains(r)))
                    .chain(validated.get(key).copied())
                    .find(|r| r != rid);
                if let Some(existing) = existing {
                    return Err(CoreError::DuplicateKey {
                        index: set.index.clone(),
                        key: key.clone(),
                        existing,
                        rejected: *rid,
                    });
                }
                validated.insert(key, *rid);
            }
        }
        Ok(())
    }

    /// Merges change sets into the committed entries.
    ///
    /// Callers verify the sets first; merging itself cannot fail. Adds are
    /// applied before removes.
    pub fn apply(&mut self, changes: &[IndexChangeSet]) {
        for set in changes {
            let Some(engine) = self.indexes.get_mut(&set.index) else {
                continue;
            };
            if set.cleared {
                engine.clear();
            }
            for (key, rid) in &set.adds {
                engine.insert_validated(key.clone(), *rid);
            }
            for (key, rid) in &set.removes {
                engine.remove(key, *rid);
            }
        }
    }

    /// Removes every entry pointing at a matching record, in every index.
    /// Returns the number of entries removed.
    pub fn remove_records(&mut self, doomed: &dyn Fn(Rid) -> bool) -> usize {
        self.indexes
            .values_mut()
            .map(|engine| engine.remove_records(doomed))
            .sum()
    }
}
