//! Optimistic concurrency control.
//!
//! Transactions never lock while they run. At commit, every record the
//! transaction updates or deletes must still carry the version it observed;
//! otherwise the commit fails with `Conflict`.
//!
//! Commits that touch overlapping records or unique keys serialize on a
//! table of striped mutexes, so validation and apply happen as one step for
//! them while disjoint commits proceed in parallel.

use crate::error::{CoreError, CoreResult};
use crate::index::IndexKey;
use kestrel_storage::{RecordStore, Rid, Version};
use parking_lot::{Mutex, MutexGuard};
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};
use tracing::debug;

/// Checks that every record still has the version the transaction observed.
///
/// # Errors
///
/// Returns `Conflict` for the first record whose stored version differs,
/// including records deleted in the meantime.
pub fn validate_versions<I>(store: &dyn RecordStore, checks: I) -> CoreResult<()>
where
    I: IntoIterator<Item = (Rid, Version)>,
{
    for (rid, expected) in checks {
        let actual = store.current_version(rid)?;
        if actual != Some(expected) {
            debug!(%rid, expected, ?actual, "version check failed");
            return Err(CoreError::Conflict {
                rid,
                expected,
                actual,
            });
        }
    }
    Ok(())
}

/// What a commit locks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum LockTarget<'a> {
    /// A record being updated or deleted.
    Record(Rid),
    /// A key being added to a unique index.
    UniqueKey(&'a str, &'a IndexKey),
}

/// Fixed table of commit mutexes.
///
/// Guards are always taken in ascending stripe order.
#[derive(Debug)]
pub(crate) struct StripedLocks {
    stripes: Vec<Mutex<()>>,
}

impl StripedLocks {
    pub(crate) fn new(count: usize) -> Self {
        Self {
            stripes: (0..count.max(1)).map(|_| Mutex::new(())).collect(),
        }
    }

    pub(crate) fn stripe_of(&self, target: &LockTarget<'_>) -> usize {
        let mut hasher = DefaultHasher::new();
        target.hash(&mut hasher);
        (hasher.finish() % self.stripes.len() as u64) as usize
    }

    /// Locks the stripes of the given targets.
    pub(crate) fn lock<'t>(
        &self,
        targets: impl IntoIterator<Item = LockTarget<'t>>,
    ) -> Vec<MutexGuard<'_, ()>> {
        let stripes: BTreeSet<usize> = targets
            .into_iter()
            .map(|target| self.stripe_of(&target))
            .collect();
        stripes.into_iter().map(|s| self.stripes[s].lock()).collect()
    }

    /// Locks every stripe, excluding all commits.
    pub(crate) fn lock_all(&self) -> Vec<MutexGuard<'_, ()>> {
        self.stripes.iter().map(Mutex::lock).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_storage::InMemoryRecordStore;

    #[test]
    fn matching_versions_pass() {
        let store = InMemoryRecordStore::new();
        let rid = store.allocate_identity(1).unwrap();
        store.write_record(rid, b"a", None).unwrap();
        store.write_record(rid, b"b", Some(0)).unwrap();

        validate_versions(&store, [(rid, 1)]).unwrap();
    }

    #[test]
    fn stale_version_conflicts() {
        let store = InMemoryRecordStore::new();
        let rid = store.allocate_identity(1).unwrap();
        store.write_record(rid, b"a", None).unwrap();
        store.write_record(rid, b"b", Some(0)).unwrap();

        let err = validate_versions(&store, [(rid, 0)]).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Conflict { expected: 0, actual: Some(1), .. }
        ));
    }

    #[test]
    fn deleted_record_conflicts() {
        let store = InMemoryRecordStore::new();
        let rid = store.allocate_identity(1).unwrap();
        store.write_record(rid, b"a", None).unwrap();
        store.delete_record(rid, 0).unwrap();

        let err = validate_versions(&store, [(rid, 0)]).unwrap_err();
        assert!(matches!(err, CoreError::Conflict { actual: None, .. }));
    }

    #[test]
    fn stripes_are_stable_and_bounded() {
        let locks = StripedLocks::new(8);
        let key = IndexKey::from("a@x");
        let target = LockTarget::UniqueKey("Person.email", &key);
        assert_eq!(locks.stripe_of(&target), locks.stripe_of(&target));
        assert!(locks.stripe_of(&LockTarget::Record(Rid::new(3, 9))) < 8);
    }

    #[test]
    fn repeated_targets_lock_once() {
        let locks = StripedLocks::new(4);
        let rid = Rid::new(1, 1);
        let guards = locks.lock([LockTarget::Record(rid), LockTarget::Record(rid)]);
        assert_eq!(guards.len(), 1);
        drop(guards);
        assert_eq!(locks.lock_all().len(), 4);
    }

    #[test]
    fn zero_stripes_rounds_up() {
        assert_eq!(StripedLocks::new(0).lock_all().len(), 1);
    }
}
