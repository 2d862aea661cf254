//! In-memory record store.

use crate::error::{StorageError, StorageResult};
use crate::rid::Rid;
use crate::store::{RecordStore, RecordWrite, StoredRecord, Version, WriteOutcome};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

/// An in-memory record store.
///
/// This store keeps every record in a single ordered map and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral databases that don't need persistence
///
/// # Thread Safety
///
/// All operations take `&self`; the store can be shared across threads
/// behind an `Arc`.
///
/// # Example
///
/// ```rust
/// use kestrel_storage::{InMemoryRecordStore, RecordStore};
///
/// let store = InMemoryRecordStore::new();
/// let rid = store.allocate_identity(3).unwrap();
/// let version = store.write_record(rid, b"body", None).unwrap();
/// assert_eq!(version, 0);
/// assert_eq!(store.load_record(rid).unwrap().unwrap().body, b"body");
/// ```
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    state: RwLock<State>,
    closed: AtomicBool,
}

#[derive(Debug, Default)]
struct State {
    records: BTreeMap<Rid, StoredRecord>,
    next_positions: HashMap<i32, i64>,
}

impl State {
    fn reserve(&mut self, rid: Rid) {
        let next = self.next_positions.entry(rid.collection_id()).or_insert(0);
        if *next <= rid.position() {
            *next = rid.position() + 1;
        }
    }
}

fn collection_bounds(collection_id: i32) -> std::ops::RangeInclusive<Rid> {
    Rid::new(collection_id, 0)..=Rid::new(collection_id, i64::MAX)
}

fn check_identity(rid: Rid) -> StorageResult<()> {
    if rid.is_persistent() {
        Ok(())
    } else {
        Err(StorageError::InvalidIdentity { rid })
    }
}

fn check_version(rid: Rid, expected: Version, actual: Option<Version>) -> StorageResult<()> {
    if actual == Some(expected) {
        Ok(())
    } else {
        Err(StorageError::VersionConflict {
            rid,
            expected,
            actual,
        })
    }
}

impl InMemoryRecordStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of records across all collections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().records.len()
    }

    /// Returns true if the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.read().records.is_empty()
    }

    /// Closes the store. Every later operation fails with `Closed`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn ensure_open(&self) -> StorageResult<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(StorageError::Closed)
        } else {
            Ok(())
        }
    }
}

impl RecordStore for InMemoryRecordStore {
    fn load_record(&self, rid: Rid) -> StorageResult<Option<StoredRecord>> {
        self.ensure_open()?;
        Ok(self.state.read().records.get(&rid).cloned())
    }

    fn current_version(&self, rid: Rid) -> StorageResult<Option<Version>> {
        self.ensure_open()?;
        Ok(self.state.read().records.get(&rid).map(|r| r.version))
    }

    fn write_record(
        &self,
        rid: Rid,
        body: &[u8],
        expected: Option<Version>,
    ) -> StorageResult<Version> {
        let write = match expected {
            None => RecordWrite::Create {
                rid,
                body: body.to_vec(),
            },
            Some(expected) => RecordWrite::Update {
                rid,
                body: body.to_vec(),
                expected,
            },
        };
        let outcome = self.apply_batch(vec![write])?;
        Ok(outcome.first().and_then(|o| o.version).unwrap_or_default())
    }

    fn delete_record(&self, rid: Rid, expected: Version) -> StorageResult<()> {
        self.apply_batch(vec![RecordWrite::Delete { rid, expected }])
            .map(|_| ())
    }

    fn allocate_identity(&self, collection_id: i32) -> StorageResult<Rid> {
        self.ensure_open()?;
        if collection_id < 0 {
            return Err(StorageError::InvalidIdentity {
                rid: Rid::new(collection_id, 0),
            });
        }
        let mut state = self.state.write();
        let next = state.next_positions.entry(collection_id).or_insert(0);
        let rid = Rid::new(collection_id, *next);
        *next += 1;
        Ok(rid)
    }

    fn apply_batch(&self, writes: Vec<RecordWrite>) -> StorageResult<Vec<WriteOutcome>> {
        self.ensure_open()?;
        let mut state = self.state.write();

        // Validate the whole batch against the stored state plus the
        // effect of earlier writes of the same batch.
        let mut pending: HashMap<Rid, Option<Version>> = HashMap::new();
        let mut outcomes = Vec::with_capacity(writes.len());
        for write in &writes {
            let rid = write.rid();
            check_identity(rid)?;
            let actual = match pending.get(&rid) {
                Some(version) => *version,
                None => state.records.get(&rid).map(|r| r.version),
            };
            let next = match write {
                RecordWrite::Create { .. } => {
                    if actual.is_some() {
                        return Err(StorageError::RecordExists { rid });
                    }
                    Some(0)
                }
                RecordWrite::Update { expected, .. } => {
                    check_version(rid, *expected, actual)?;
                    Some(expected + 1)
                }
                RecordWrite::Delete { expected, .. } => {
                    check_version(rid, *expected, actual)?;
                    None
                }
            };
            pending.insert(rid, next);
            outcomes.push(WriteOutcome { rid, version: next });
        }

        for (write, outcome) in writes.into_iter().zip(&outcomes) {
            match write {
                RecordWrite::Create { rid, body } | RecordWrite::Update { rid, body, .. } => {
                    state.reserve(rid);
                    state.records.insert(
                        rid,
                        StoredRecord {
                            body,
                            version: outcome.version.unwrap_or_default(),
                        },
                    );
                }
                RecordWrite::Delete { rid, .. } => {
                    state.records.remove(&rid);
                }
            }
        }
        Ok(outcomes)
    }

    fn scan_collection(&self, collection_id: i32) -> StorageResult<Vec<(Rid, StoredRecord)>> {
        self.ensure_open()?;
        let state = self.state.read();
        Ok(state
            .records
            .range(collection_bounds(collection_id))
            .map(|(rid, record)| (*rid, record.clone()))
            .collect())
    }

    fn record_count(&self, collection_id: i32) -> StorageResult<u64> {
        self.ensure_open()?;
        let state = self.state.read();
        Ok(state.records.range(collection_bounds(collection_id)).count() as u64)
    }

    fn truncate_collection(&self, collection_id: i32) -> StorageResult<u64> {
        self.ensure_open()?;
        let mut state = self.state.write();
        let doomed: Vec<Rid> = state
            .records
            .range(collection_bounds(collection_id))
            .map(|(rid, _)| *rid)
            .collect();
        for rid in &doomed {
            state.records.remove(rid);
        }
        Ok(doomed.len() as u64)
    }
}
