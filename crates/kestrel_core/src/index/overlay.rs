//! Per-transaction index overlay.
//!
//! The overlay holds a transaction's pending index changes and presents
//! `committed - removed + added` as the transaction's private view of each
//! index. Committed entries are only read, never written.
//!
//! For every `(index, key, rid)` the overlay keeps at most one of
//! *added* or *removed*:
//!
//! - removing an entry this transaction added drops the add
//! - adding an entry this transaction removed turns the removal into an add
//!   that is remembered as a restore, so removing it again records the
//!   removal once more

use crate::error::{CoreError, CoreResult};
use crate::index::key::{key_in_range, IndexKey};
use crate::index::maintainer::IndexDiff;
use crate::index::store::IndexChangeSet;
use crate::index::traits::Index;
use kestrel_storage::Rid;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Bound;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AddOrigin {
    /// Added by this transaction.
    Fresh,
    /// Removed and then re-added by this transaction.
    Restored,
}

#[derive(Debug, Clone, Default)]
struct KeyChanges {
    added: BTreeMap<Rid, AddOrigin>,
    removed: BTreeSet<Rid>,
}

impl KeyChanges {
    fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    /// Applies these changes to the committed records of the key.
    fn merge(&self, committed: impl IntoIterator<Item = Rid>) -> BTreeSet<Rid> {
        let mut rids: BTreeSet<Rid> = committed
            .into_iter()
            .filter(|rid| !self.removed.contains(rid))
            .collect();
        rids.extend(self.added.keys().copied());
        rids
    }
}

#[derive(Debug, Clone, Default)]
struct IndexDelta {
    cleared: bool,
    keys: BTreeMap<IndexKey, KeyChanges>,
}

impl IndexDelta {
    fn committed(&self, engine: &dyn Index, key: &IndexKey) -> Vec<Rid> {
        if self.cleared {
            Vec::new()
        } else {
            engine.lookup(key)
        }
    }
}

/// Pending index changes of one transaction.
#[derive(Debug, Clone, Default)]
pub struct IndexOverlay {
    deltas: BTreeMap<String, IndexDelta>,
}

impl IndexOverlay {
    /// Creates an empty overlay.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if no index has pending changes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }

    /// Returns true if the transaction cleared the index.
    #[must_use]
    pub fn is_cleared(&self, index: &str) -> bool {
        self.deltas.get(index).is_some_and(|d| d.cleared)
    }

    /// Returns true if any index was cleared.
    #[must_use]
    pub fn has_cleared_index(&self) -> bool {
        self.deltas.values().any(|d| d.cleared)
    }

    /// Returns the pending adds of an index in key order.
    #[must_use]
    pub fn pending_adds(&self, index: &str) -> Vec<(IndexKey, Rid)> {
        self.collect(index, |changes| changes.added.keys().copied().collect())
    }

    /// Returns the pending removals of an index in key order.
    #[must_use]
    pub fn pending_removes(&self, index: &str) -> Vec<(IndexKey, Rid)> {
        self.collect(index, |changes| changes.removed.iter().copied().collect())
    }

    fn collect(&self, index: &str, pick: impl Fn(&KeyChanges) -> Vec<Rid>) -> Vec<(IndexKey, Rid)> {
        let Some(delta) = self.deltas.get(index) else {
            return Vec::new();
        };
        delta
            .keys
            .iter()
            .flat_map(|(key, changes)| pick(changes).into_iter().map(move |rid| (key.clone(), rid)))
            .collect()
    }

    /// Checks that adding `(key, rid)` keeps a unique index unique in this
    /// transaction's view.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateKey` if the key already maps to another record.
    pub fn check_put(&self, engine: &dyn Index, key: &IndexKey, rid: Rid) -> CoreResult<()> {
        let definition = engine.definition();
        if !definition.is_unique() {
            return Ok(());
        }
        if let Some(existing) = self.lookup(engine, key).into_iter().find(|r| *r != rid) {
            return Err(CoreError::DuplicateKey {
                index: definition.name.clone(),
                key: key.clone(),
                existing,
                rejected: rid,
            });
        }
        Ok(())
    }

    /// Stages the index changes of one save for `rid`.
    ///
    /// Every add is checked against this transaction's view before anything
    /// is staged, so either all of the changes land or none do.
    ///
    /// # Errors
    ///
    /// Returns the error of `engine_for` for an unknown index, or
    /// `DuplicateKey` if an add would map a unique key to a second record.
    pub fn apply_diffs<'e>(
        &mut self,
        engine_for: impl Fn(&str) -> CoreResult<&'e dyn Index>,
        rid: Rid,
        changes: Vec<IndexDiff>,
    ) -> CoreResult<()> {
        for change in changes.iter().filter(|c| !c.adds.is_empty()) {
            let engine = engine_for(&change.index)?;
            for key in &change.adds {
                self.check_put(engine, key, rid)?;
            }
        }
        for change in changes {
            for key in change.removes {
                self.remove(&change.index, key, rid);
            }
            for key in change.adds {
                self.stage_put(&change.index, key, rid);
            }
        }
        Ok(())
    }

    /// Stages a single add after checking uniqueness.
    #[cfg(test)]
    pub(crate) fn put(&mut self, engine: &dyn Index, key: IndexKey, rid: Rid) -> CoreResult<()> {
        let change = IndexDiff {
            index: engine.definition().name.clone(),
            removes: Vec::new(),
            adds: vec![key],
        };
        self.apply_diffs(|_| Ok(engine), rid, vec![change])
    }

    fn stage_put(&mut self, index: &str, key: IndexKey, rid: Rid) {
        trace!(index, %key, %rid, "overlay put");
        let changes = self
            .deltas
            .entry(index.to_string())
            .or_default()
            .keys
            .entry(key)
            .or_default();
        if changes.removed.remove(&rid) {
            changes.added.insert(rid, AddOrigin::Restored);
        } else {
            changes.added.entry(rid).or_insert(AddOrigin::Fresh);
        }
    }

    /// Stages a removal.
    pub fn remove(&mut self, index: &str, key: IndexKey, rid: Rid) {
        trace!(index, %key, %rid, "overlay remove");
        let delta = self.deltas.entry(index.to_string()).or_default();
        let changes = delta.keys.entry(key.clone()).or_default();
        match changes.added.remove(&rid) {
            Some(AddOrigin::Fresh) => {}
            Some(AddOrigin::Restored) | None => {
                changes.removed.insert(rid);
            }
        }
        if changes.is_empty() {
            delta.keys.remove(&key);
        }
        if !delta.cleared && delta.keys.is_empty() {
            self.deltas.remove(index);
        }
    }

    /// Hides every committed entry of the index from this transaction and
    /// drops its pending changes. The entries are removed at commit.
    pub fn clear(&mut self, index: &str) {
        trace!(index, "overlay clear");
        let delta = self.deltas.entry(index.to_string()).or_default();
        delta.cleared = true;
        delta.keys.clear();
    }

    /// Drops every pending change of an index.
    pub(crate) fn forget(&mut self, index: &str) {
        self.deltas.remove(index);
    }

    /// Returns the records a key maps to in this transaction's view.
    pub fn lookup(&self, engine: &dyn Index, key: &IndexKey) -> Vec<Rid> {
        match self.deltas.get(&engine.definition().name) {
            None => engine.lookup(key),
            Some(delta) => match delta.keys.get(key) {
                Some(changes) => changes.merge(delta.committed(engine, key)).into_iter().collect(),
                None => delta.committed(engine, key),
            },
        }
    }

    /// Returns the entries for a list of keys, in ascending or descending
    /// key order. Duplicate keys are visited once.
    pub fn entries(
        &self,
        engine: &dyn Index,
        keys: &[IndexKey],
        ascending: bool,
    ) -> Vec<(IndexKey, Rid)> {
        let keys: BTreeSet<&IndexKey> = keys.iter().collect();
        let mut out: Vec<(IndexKey, Rid)> = keys
            .into_iter()
            .flat_map(|key| {
                self.lookup(engine, key)
                    .into_iter()
                    .map(move |rid| (key.clone(), rid))
            })
            .collect();
        if !ascending {
            out.reverse();
        }
        out
    }

    /// Range scan over this transaction's view.
    pub fn range(
        &self,
        engine: &dyn Index,
        from: Bound<&IndexKey>,
        to: Bound<&IndexKey>,
        ascending: bool,
    ) -> Vec<(IndexKey, Rid)> {
        let mut out: BTreeSet<(IndexKey, Rid)> = BTreeSet::new();
        match self.deltas.get(&engine.definition().name) {
            None => out.extend(engine.range(from, to)),
            Some(delta) => {
                if !delta.cleared {
                    out.extend(engine.range(from, to).into_iter().filter(|(key, rid)| {
                        delta
                            .keys
                            .get(key)
                            .map_or(true, |changes| !changes.removed.contains(rid))
                    }));
                }
                for (key, changes) in &delta.keys {
                    if key_in_range(key, from, to) {
                        out.extend(changes.added.keys().map(|rid| (key.clone(), *rid)));
                    }
                }
            }
        }
        let mut out: Vec<(IndexKey, Rid)> = out.into_iter().collect();
        if !ascending {
            out.reverse();
        }
        out
    }

    /// Number of entries in this transaction's view.
    pub fn size(&self, engine: &dyn Index) -> usize {
        let Some(delta) = self.deltas.get(&engine.definition().name) else {
            return engine.len();
        };
        let mut size = if delta.cleared { 0 } else { engine.len() };
        for (key, changes) in &delta.keys {
            let committed = delta.committed(engine, key);
            let before = committed.len();
            let after = changes.merge(committed).len();
            size = (size + after).saturating_sub(before);
        }
        size
    }

    /// Rewrites temporary record ids and links inside keys to their final
    /// identities.
    pub(crate) fn remap(&mut self, remap: &HashMap<Rid, Rid>) {
        let resolve = |rid: Rid| remap.get(&rid).copied();
        for delta in self.deltas.values_mut() {
            let keys = std::mem::take(&mut delta.keys);
            for (mut key, changes) in keys {
                if key.links_temporary() {
                    key.remap_links(&resolve);
                }
                let target = delta.keys.entry(key).or_default();
                for (rid, origin) in changes.added {
                    target.added.insert(resolve(rid).unwrap_or(rid), origin);
                }
                for rid in changes.removed {
                    target.removed.insert(resolve(rid).unwrap_or(rid));
                }
            }
        }
    }

    /// Returns the net change set of every touched index.
    ///
    /// Removals of records that never reached storage are dropped.
    pub fn change_sets(&self) -> Vec<IndexChangeSet> {
        self.deltas
            .iter()
            .map(|(index, delta)| {
                let mut adds = Vec::new();
                let mut removes = Vec::new();
                for (key, changes) in &delta.keys {
                    adds.extend(changes.added.keys().map(|rid| (key.clone(), *rid)));
                    removes.extend(
                        changes
                            .removed
                            .iter()
                            .filter(|rid| !rid.is_temporary())
                            .map(|rid| (key.clone(), *rid)),
                    );
                }
                IndexChangeSet {
                    index: index.clone(),
                    cleared: delta.cleared,
                    adds,
                    removes,
                }
            })
            .filter(|set| !set.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::btree::BTreeIndex;
    use crate::index::hash::HashIndex;
    use crate::schema::{IndexDefinition, PropertyType};

    fn unique_email() -> IndexDefinition {
        IndexDefinition::new("Person.email", "Person")
            .property("email", PropertyType::String)
            .unique()
    }

    fn engines() -> Vec<Box<dyn Index>> {
        vec![
            Box::new(BTreeIndex::new(unique_email())),
            Box::new(HashIndex::new(unique_email().hash())),
        ]
    }

    fn key(s: &str) -> IndexKey {
        IndexKey::from(s)
    }

    const INDEX: &str = "Person.email";

    #[test]
    fn put_is_visible_in_lookup() {
        let engine = BTreeIndex::new(unique_email());
        let mut overlay = IndexOverlay::new();
        overlay.put(&engine, key("a@x"), Rid::temporary(0)).unwrap();

        assert_eq!(overlay.lookup(&engine, &key("a@x")), vec![Rid::temporary(0)]);
        assert!(engine.lookup(&key("a@x")).is_empty());
    }

    #[test]
    fn refused_add_stages_nothing_from_the_save() {
        let email = BTreeIndex::new(unique_email());
        let handle = HashIndex::new(
            IndexDefinition::new("Person.handle", "Person")
                .property("handle", PropertyType::String)
                .unique()
                .hash(),
        );
        let engine_for = |name: &str| -> CoreResult<&dyn Index> {
            match name {
                INDEX => Ok(&email),
                _ => Ok(&handle),
            }
        };
        let mut overlay = IndexOverlay::new();
        overlay.put(&handle, key("ada"), Rid::new(1, 0)).unwrap();

        let changes = vec![
            IndexDiff {
                index: INDEX.into(),
                removes: vec![key("old@x")],
                adds: vec![key("new@x")],
            },
            IndexDiff {
                index: "Person.handle".into(),
                removes: Vec::new(),
                adds: vec![key("ada")],
            },
        ];
        let err = overlay.apply_diffs(engine_for, Rid::new(1, 1), changes).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateKey { .. }));
        assert!(overlay.pending_adds(INDEX).is_empty());
        assert!(overlay.pending_removes(INDEX).is_empty());
        assert_eq!(overlay.pending_adds("Person.handle").len(), 1);

        let changes = vec![IndexDiff {
            index: INDEX.into(),
            removes: vec![key("old@x")],
            adds: vec![key("new@x")],
        }];
        overlay.apply_diffs(engine_for, Rid::new(1, 1), changes).unwrap();
        assert_eq!(overlay.pending_adds(INDEX), vec![(key("new@x"), Rid::new(1, 1))]);
        assert_eq!(overlay.pending_removes(INDEX), vec![(key("old@x"), Rid::new(1, 1))]);
    }

    #[test]
    fn second_record_on_unique_key_fails_fast() {
        let engine = BTreeIndex::new(unique_email());
        let mut overlay = IndexOverlay::new();
        overlay.put(&engine, key("k"), Rid::new(1, 0)).unwrap();

        let err = overlay.put(&engine, key("k"), Rid::new(1, 1)).unwrap_err();
        assert!(matches!(
            err,
            CoreError::DuplicateKey { existing, rejected, .. }
                if existing == Rid::new(1, 0) && rejected == Rid::new(1, 1)
        ));
        assert_eq!(overlay.pending_adds(INDEX).len(), 1);
    }

    #[test]
    fn committed_owner_blocks_put_until_removed() {
        let mut engine = BTreeIndex::new(unique_email());
        engine.insert(key("k"), Rid::new(1, 0)).unwrap();
        let mut overlay = IndexOverlay::new();

        assert!(overlay.put(&engine, key("k"), Rid::new(1, 1)).is_err());

        overlay.remove(INDEX, key("k"), Rid::new(1, 0));
        overlay.put(&engine, key("k"), Rid::new(1, 1)).unwrap();
        assert_eq!(overlay.lookup(&engine, &key("k")), vec![Rid::new(1, 1)]);
    }

    #[test]
    fn removing_fresh_add_leaves_nothing() {
        let engine = BTreeIndex::new(unique_email());
        let mut overlay = IndexOverlay::new();
        overlay.put(&engine, key("k"), Rid::temporary(0)).unwrap();
        overlay.remove(INDEX, key("k"), Rid::temporary(0));

        assert!(overlay.is_empty());
        assert!(overlay.change_sets().is_empty());
    }

    #[test]
    fn repeated_updates_leave_one_add() {
        let engine = BTreeIndex::new(unique_email());
        let mut overlay = IndexOverlay::new();
        let rid = Rid::new(1, 0);
        let mut previous: Option<IndexKey> = None;
        for n in 0..10 {
            let next = key(&format!("v{n}"));
            if let Some(old) = previous.take() {
                overlay.remove(INDEX, old, rid);
            }
            overlay.put(&engine, next.clone(), rid).unwrap();
            previous = Some(next);
        }
        assert_eq!(overlay.pending_adds(INDEX), vec![(key("v9"), rid)]);
    }

    #[test]
    fn remove_then_add_same_entry_is_never_absent() {
        for mut engine in engines() {
            engine.insert(key("k"), Rid::new(1, 0)).unwrap();
            let mut overlay = IndexOverlay::new();

            overlay.remove(INDEX, key("k"), Rid::new(1, 0));
            assert!(overlay.lookup(engine.as_ref(), &key("k")).is_empty());
            overlay.put(engine.as_ref(), key("k"), Rid::new(1, 0)).unwrap();

            assert_eq!(overlay.lookup(engine.as_ref(), &key("k")), vec![Rid::new(1, 0)]);
            assert_eq!(overlay.pending_adds(INDEX), vec![(key("k"), Rid::new(1, 0))]);
            assert!(overlay.pending_removes(INDEX).is_empty());

            // A restored entry that is removed again is a removal once more.
            overlay.remove(INDEX, key("k"), Rid::new(1, 0));
            assert!(overlay.lookup(engine.as_ref(), &key("k")).is_empty());
            assert_eq!(overlay.pending_removes(INDEX), vec![(key("k"), Rid::new(1, 0))]);
        }
    }

    #[test]
    fn range_merges_committed_and_pending() {
        for mut engine in engines() {
            for (pos, name) in ["a", "c", "e"].into_iter().enumerate() {
                engine.insert(key(name), Rid::new(1, pos as i64)).unwrap();
            }
            let mut overlay = IndexOverlay::new();
            overlay.remove(INDEX, key("c"), Rid::new(1, 1));
            overlay.put(engine.as_ref(), key("d"), Rid::temporary(0)).unwrap();

            let found = overlay.range(
                engine.as_ref(),
                Bound::Included(&key("b")),
                Bound::Unbounded,
                true,
            );
            assert_eq!(
                found,
                vec![(key("d"), Rid::temporary(0)), (key("e"), Rid::new(1, 2))]
            );

            let descending = overlay.range(engine.as_ref(), Bound::Unbounded, Bound::Unbounded, false);
            let keys: Vec<IndexKey> = descending.into_iter().map(|(k, _)| k).collect();
            assert_eq!(keys, vec![key("e"), key("d"), key("a")]);
        }
    }

    #[test]
    fn entries_follow_requested_order() {
        let mut engine = BTreeIndex::new(unique_email());
        engine.insert(key("a"), Rid::new(1, 0)).unwrap();
        engine.insert(key("b"), Rid::new(1, 1)).unwrap();
        let overlay = IndexOverlay::new();

        let keys = vec![key("b"), key("a"), key("zz"), key("b")];
        let asc = overlay.entries(&engine, &keys, true);
        assert_eq!(asc, vec![(key("a"), Rid::new(1, 0)), (key("b"), Rid::new(1, 1))]);
        let desc = overlay.entries(&engine, &keys, false);
        assert_eq!(desc[0].0, key("b"));
    }

    #[test]
    fn size_accounts_for_pending_changes() {
        let mut engine = BTreeIndex::new(unique_email());
        engine.insert(key("a"), Rid::new(1, 0)).unwrap();
        engine.insert(key("b"), Rid::new(1, 1)).unwrap();
        let mut overlay = IndexOverlay::new();

        overlay.remove(INDEX, key("a"), Rid::new(1, 0));
        overlay.put(&engine, key("c"), Rid::temporary(0)).unwrap();
        overlay.put(&engine, key("d"), Rid::temporary(1)).unwrap();
        assert_eq!(overlay.size(&engine), 3);

        overlay.clear(INDEX);
        assert_eq!(overlay.size(&engine), 0);
    }

    #[test]
    fn clear_hides_committed_entries() {
        let mut engine = BTreeIndex::new(unique_email());
        engine.insert(key("a"), Rid::new(1, 0)).unwrap();
        let mut overlay = IndexOverlay::new();
        overlay.clear(INDEX);

        assert!(overlay.lookup(&engine, &key("a")).is_empty());
        overlay.put(&engine, key("a"), Rid::new(1, 9)).unwrap();

        let sets = overlay.change_sets();
        assert_eq!(sets.len(), 1);
        assert!(sets[0].cleared);
        assert_eq!(sets[0].adds, vec![(key("a"), Rid::new(1, 9))]);
    }

    #[test]
    fn remap_rewrites_rids_and_links() {
        let link_index = IndexDefinition::new("Edge.out", "Edge").property("out", PropertyType::Link);
        let engine = BTreeIndex::new(link_index);
        let mut overlay = IndexOverlay::new();
        overlay
            .put(&engine, IndexKey::from(Rid::temporary(0)), Rid::temporary(1))
            .unwrap();

        let remap = HashMap::from([
            (Rid::temporary(0), Rid::new(3, 0)),
            (Rid::temporary(1), Rid::new(4, 0)),
        ]);
        overlay.remap(&remap);

        assert_eq!(
            overlay.pending_adds("Edge.out"),
            vec![(IndexKey::from(Rid::new(3, 0)), Rid::new(4, 0))]
        );
    }
}
