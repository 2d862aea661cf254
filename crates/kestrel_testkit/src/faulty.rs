//! Fault injection for the record store.
//!
//! [`FaultyRecordStore`] wraps a real store and fails selected calls on
//! demand, so tests can check that the core leaves committed state intact
//! when storage gives out part way through an operation.

use kestrel_storage::{
    RecordStore, RecordWrite, Rid, StorageError, StorageResult, StoredRecord, Version,
    WriteOutcome,
};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// A record store that fails on request.
///
/// Faults are armed with the `fail_*` methods and fire on the next
/// matching call. Every call is delegated to the wrapped store otherwise.
pub struct FaultyRecordStore {
    inner: Arc<dyn RecordStore>,
    failing_batches: AtomicUsize,
    failing_allocations: AtomicUsize,
    failing_truncates: Mutex<BTreeSet<i32>>,
    closed: AtomicBool,
    batches: AtomicUsize,
}

impl FaultyRecordStore {
    /// Wraps a store.
    pub fn new(inner: Arc<dyn RecordStore>) -> Self {
        Self {
            inner,
            failing_batches: AtomicUsize::new(0),
            failing_allocations: AtomicUsize::new(0),
            failing_truncates: Mutex::new(BTreeSet::new()),
            closed: AtomicBool::new(false),
            batches: AtomicUsize::new(0),
        }
    }

    /// Fails the next `count` batch applications.
    pub fn fail_batches(&self, count: usize) {
        self.failing_batches.store(count, Ordering::SeqCst);
    }

    /// Fails the next `count` identity allocations.
    pub fn fail_allocations(&self, count: usize) {
        self.failing_allocations.store(count, Ordering::SeqCst);
    }

    /// Fails every truncation of a collection until cleared.
    pub fn fail_truncate_of(&self, collection_id: i32) {
        self.failing_truncates.lock().insert(collection_id);
    }

    /// Clears every armed fault and reopens the store.
    pub fn heal(&self) {
        self.failing_batches.store(0, Ordering::SeqCst);
        self.failing_allocations.store(0, Ordering::SeqCst);
        self.failing_truncates.lock().clear();
        self.closed.store(false, Ordering::SeqCst);
    }

    /// Makes every call fail with `StorageError::Closed`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Number of batches that reached the wrapped store.
    pub fn applied_batches(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }

    fn check_open(&self) -> StorageResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StorageError::Closed);
        }
        Ok(())
    }

    fn take_fault(counter: &AtomicUsize, what: &str) -> StorageResult<()> {
        let armed = counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if armed {
            debug!(operation = what, "injecting storage fault");
            return Err(StorageError::Io(io::Error::new(
                io::ErrorKind::Other,
                format!("injected {what} failure"),
            )));
        }
        Ok(())
    }
}

impl RecordStore for FaultyRecordStore {
    fn load_record(&self, rid: Rid) -> StorageResult<Option<StoredRecord>> {
        self.check_open()?;
        self.inner.load_record(rid)
    }

    fn current_version(&self, rid: Rid) -> StorageResult<Option<Version>> {
        self.check_open()?;
        self.inner.current_version(rid)
    }

    fn write_record(
        &self,
        rid: Rid,
        body: &[u8],
        expected: Option<Version>,
    ) -> StorageResult<Version> {
        self.check_open()?;
        self.inner.write_record(rid, body, expected)
    }

    fn delete_record(&self, rid: Rid, expected: Version) -> StorageResult<()> {
        self.check_open()?;
        self.inner.delete_record(rid, expected)
    }

    fn allocate_identity(&self, collection_id: i32) -> StorageResult<Rid> {
        self.check_open()?;
        Self::take_fault(&self.failing_allocations, "allocation")?;
        self.inner.allocate_identity(collection_id)
    }

    fn apply_batch(&self, writes: Vec<RecordWrite>) -> StorageResult<Vec<WriteOutcome>> {
        self.check_open()?;
        Self::take_fault(&self.failing_batches, "batch")?;
        let outcomes = self.inner.apply_batch(writes)?;
        self.batches.fetch_add(1, Ordering::SeqCst);
        Ok(outcomes)
    }

    fn scan_collection(&self, collection_id: i32) -> StorageResult<Vec<(Rid, StoredRecord)>> {
        self.check_open()?;
        self.inner.scan_collection(collection_id)
    }

    fn record_count(&self, collection_id: i32) -> StorageResult<u64> {
        self.check_open()?;
        self.inner.record_count(collection_id)
    }

    fn truncate_collection(&self, collection_id: i32) -> StorageResult<u64> {
        self.check_open()?;
        if self.failing_truncates.lock().contains(&collection_id) {
            debug!(collection_id, "injecting truncate fault");
            return Err(StorageError::Io(io::Error::new(
                io::ErrorKind::Other,
                format!("injected truncate failure on collection {collection_id}"),
            )));
        }
        self.inner.truncate_collection(collection_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_storage::InMemoryRecordStore;

    #[test]
    fn test_batch_fault_fires_once() {
        let store = FaultyRecordStore::new(Arc::new(InMemoryRecordStore::new()));
        let rid = store.allocate_identity(0).unwrap();
        store.fail_batches(1);

        let write = || vec![RecordWrite::Create { rid, body: b"x".to_vec() }];
        assert!(matches!(store.apply_batch(write()), Err(StorageError::Io(_))));
        assert_eq!(store.load_record(rid).unwrap(), None);
        store.apply_batch(write()).unwrap();
        assert_eq!(store.applied_batches(), 1);
    }

    #[test]
    fn test_closed_store_refuses_everything() {
        let store = FaultyRecordStore::new(Arc::new(InMemoryRecordStore::new()));
        store.close();
        assert!(matches!(store.record_count(0), Err(StorageError::Closed)));
        store.heal();
        assert_eq!(store.record_count(0).unwrap(), 0);
    }
}
