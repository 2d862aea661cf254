//! Index engine trait.

use crate::error::{CoreError, CoreResult};
use crate::index::key::IndexKey;
use crate::schema::IndexDefinition;
use kestrel_storage::Rid;
use std::collections::BTreeSet;
use std::ops::Bound;

/// A committed index engine.
///
/// Engines map keys to sets of record ids. Unique engines refuse to map a
/// key to a second record through [`Index::insert`]; the commit path uses
/// [`Index::insert_validated`] once uniqueness has been verified for the
/// whole transaction.
///
/// Lookups return record ids in ascending order; scans return entries in
/// ascending key order regardless of the engine.
pub trait Index: Send + Sync + std::fmt::Debug {
    /// Returns the index definition.
    fn definition(&self) -> &IndexDefinition;

    /// Inserts a key-record mapping, enforcing uniqueness.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateKey` if the index is unique and the key already
    /// maps to another record.
    fn insert(&mut self, key: IndexKey, rid: Rid) -> CoreResult<()> {
        if self.definition().is_unique() {
            if let Some(existing) = self.lookup(&key).into_iter().find(|r| *r != rid) {
                return Err(CoreError::DuplicateKey {
                    index: self.definition().name.clone(),
                    key,
                    existing,
                    rejected: rid,
                });
            }
        }
        self.insert_validated(key, rid);
        Ok(())
    }

    /// Inserts a key-record mapping without a uniqueness check.
    fn insert_validated(&mut self, key: IndexKey, rid: Rid);

    /// Removes a key-record mapping. Returns true if it was present.
    fn remove(&mut self, key: &IndexKey, rid: Rid) -> bool;

    /// Returns the records mapped to a key.
    fn lookup(&self, key: &IndexKey) -> Vec<Rid>;

    /// Returns entries with keys within the bounds, in ascending key order.
    fn range(&self, from: Bound<&IndexKey>, to: Bound<&IndexKey>) -> Vec<(IndexKey, Rid)>;

    /// Returns every entry in ascending key order.
    fn entries(&self) -> Vec<(IndexKey, Rid)> {
        self.range(Bound::Unbounded, Bound::Unbounded)
    }

    /// Removes every entry whose record matches the predicate.
    /// Returns the number of entries removed.
    fn remove_records(&mut self, doomed: &dyn Fn(Rid) -> bool) -> usize;

    /// Returns the number of key-record entries.
    fn len(&self) -> usize;

    /// Returns true if the index is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clears the index.
    fn clear(&mut self);
}

/// Removes matching records from every set, dropping emptied keys.
pub(crate) fn retain_records<'a, I>(sets: I, doomed: &dyn Fn(Rid) -> bool) -> usize
where
    I: Iterator<Item = &'a mut BTreeSet<Rid>>,
{
    let mut removed = 0;
    for set in sets {
        let before = set.len();
        set.retain(|rid| !doomed(*rid));
        removed += before - set.len();
    }
    removed
}
