//! Record store trait definition.

use crate::error::StorageResult;
use crate::rid::Rid;

/// Record version. A create stores version 0; every committed update adds 1.
pub type Version = u64;

/// A record body together with its stored version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    /// Encoded record body.
    pub body: Vec<u8>,
    /// Version of this body.
    pub version: Version,
}

/// One write of an atomic batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordWrite {
    /// Store a new record under a freshly allocated identity.
    Create {
        /// Identity returned by [`RecordStore::allocate_identity`].
        rid: Rid,
        /// Encoded body.
        body: Vec<u8>,
    },
    /// Replace the body of an existing record.
    Update {
        /// The record.
        rid: Rid,
        /// Encoded body.
        body: Vec<u8>,
        /// Version the writer read.
        expected: Version,
    },
    /// Remove a record.
    Delete {
        /// The record.
        rid: Rid,
        /// Version the writer read.
        expected: Version,
    },
}

impl RecordWrite {
    /// Returns the record this write targets.
    #[must_use]
    pub fn rid(&self) -> Rid {
        match self {
            Self::Create { rid, .. } | Self::Update { rid, .. } | Self::Delete { rid, .. } => *rid,
        }
    }
}

/// Result of one write of an applied batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOutcome {
    /// The record.
    pub rid: Rid,
    /// New stored version, `None` for a delete.
    pub version: Option<Version>,
}

/// The storage layer consumed by the transactional core.
///
/// A record store maps identities to opaque bodies and versions. It knows
/// nothing about classes, documents or indexes.
///
/// # Invariants
///
/// - A create stores version 0
/// - An update succeeds only if `expected` equals the stored version, and
///   stores `expected + 1`
/// - `apply_batch` validates every write before applying any of them
/// - Identities handed out by `allocate_identity` are never reused
/// - Stores must be `Send + Sync` for concurrent access
///
/// # Implementors
///
/// - [`super::InMemoryRecordStore`] - For testing and ephemeral databases
pub trait RecordStore: Send + Sync {
    /// Loads a record body and version.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    fn load_record(&self, rid: Rid) -> StorageResult<Option<StoredRecord>>;

    /// Returns the stored version of a record, `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    fn current_version(&self, rid: Rid) -> StorageResult<Option<Version>>;

    /// Writes a single record.
    ///
    /// With `expected == None` the record is created and must not exist yet.
    /// Otherwise it is updated only if the stored version equals `expected`.
    ///
    /// Returns the new version.
    ///
    /// # Errors
    ///
    /// Returns `VersionConflict` on a stale `expected`, `RecordExists` if a
    /// create hits an existing record, `InvalidIdentity` for temporary ids.
    fn write_record(&self, rid: Rid, body: &[u8], expected: Option<Version>)
        -> StorageResult<Version>;

    /// Deletes a record if its stored version equals `expected`.
    ///
    /// # Errors
    ///
    /// Returns `VersionConflict` if the record changed or no longer exists.
    fn delete_record(&self, rid: Rid, expected: Version) -> StorageResult<()>;

    /// Reserves the next identity of a collection.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection id is negative or the store is
    /// unavailable.
    fn allocate_identity(&self, collection_id: i32) -> StorageResult<Rid>;

    /// Applies a batch of writes atomically.
    ///
    /// Either every write is applied or none is. Outcomes are returned in
    /// batch order.
    ///
    /// # Errors
    ///
    /// Returns the first validation error; the store is left unchanged.
    fn apply_batch(&self, writes: Vec<RecordWrite>) -> StorageResult<Vec<WriteOutcome>>;

    /// Returns every record of a collection in position order.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    fn scan_collection(&self, collection_id: i32) -> StorageResult<Vec<(Rid, StoredRecord)>>;

    /// Returns the number of records in a collection.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    fn record_count(&self, collection_id: i32) -> StorageResult<u64>;

    /// Removes every record of a collection, returning how many were removed.
    ///
    /// Positions are not reused afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    fn truncate_collection(&self, collection_id: i32) -> StorageResult<u64>;
}
