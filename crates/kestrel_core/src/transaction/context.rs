//! Per-transaction state.

use crate::index::{Contributions, IndexOverlay};
use crate::record::Record;
use crate::types::TransactionId;
use kestrel_storage::{Rid, Version};
use std::collections::{BTreeMap, HashMap};

/// What commit does with a staged record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingWrite {
    /// Insert under a fresh identity.
    Create,
    /// Replace the committed body; `expected` is the version the
    /// transaction observed.
    Update {
        /// Version the committed record must still have.
        expected: Version,
    },
    /// Remove the committed record.
    Delete {
        /// Version the committed record must still have.
        expected: Version,
    },
}

impl PendingWrite {
    /// Version the committed record must still have, if any.
    #[must_use]
    pub const fn expected(self) -> Option<Version> {
        match self {
            Self::Create => None,
            Self::Update { expected } | Self::Delete { expected } => Some(expected),
        }
    }
}

/// A record staged by a transaction.
#[derive(Debug, Clone)]
pub(crate) struct StagedRecord {
    pub(crate) record: Record,
    pub(crate) write: PendingWrite,
}

/// Where a transaction finds a record it is asked to load.
#[derive(Debug)]
pub(crate) enum Lookup<'a> {
    /// Staged by this transaction.
    Staged(&'a Record),
    /// Deleted by this transaction.
    Deleted,
    /// Loaded earlier in this transaction.
    Cached(&'a Record),
    /// Not seen yet.
    Unknown,
}

/// The identities a transaction touches, handed to listeners before commit
/// and rollback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionSummary {
    /// Transaction id.
    pub id: TransactionId,
    /// Temporary identities of created records, in creation order.
    pub created: Vec<Rid>,
    /// Updated records.
    pub updated: Vec<Rid>,
    /// Deleted records.
    pub deleted: Vec<Rid>,
}

impl TransactionSummary {
    /// Returns true if the transaction writes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }
}

/// State of one open transaction.
///
/// Holds the staged writes, the versions observed by reads, a bounded cache
/// of loaded records, the index keys each touched record contributes and
/// the index overlay.
#[derive(Debug)]
pub struct TransactionContext {
    id: TransactionId,
    staged: BTreeMap<Rid, StagedRecord>,
    creation_order: Vec<Rid>,
    read_versions: HashMap<Rid, Version>,
    cache: HashMap<Rid, Record>,
    cache_limit: usize,
    contributions: HashMap<Rid, Contributions>,
    overlay: IndexOverlay,
    next_temporary: u64,
}

impl TransactionContext {
    pub(crate) fn new(id: TransactionId, cache_limit: usize) -> Self {
        Self {
            id,
            staged: BTreeMap::new(),
            creation_order: Vec::new(),
            read_versions: HashMap::new(),
            cache: HashMap::new(),
            cache_limit,
            contributions: HashMap::new(),
            overlay: IndexOverlay::new(),
            next_temporary: 0,
        }
    }

    /// Returns the transaction id.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Returns the pending index changes.
    #[must_use]
    pub fn overlay(&self) -> &IndexOverlay {
        &self.overlay
    }

    pub(crate) fn overlay_mut(&mut self) -> &mut IndexOverlay {
        &mut self.overlay
    }

    /// Number of staged records.
    #[must_use]
    pub fn staged_len(&self) -> usize {
        self.staged.len()
    }

    /// Returns the staged write for a record, if any.
    #[must_use]
    pub fn pending_write(&self, rid: Rid) -> Option<PendingWrite> {
        self.staged.get(&rid).map(|staged| staged.write)
    }

    pub(crate) fn lookup(&self, rid: Rid) -> Lookup<'_> {
        match self.staged.get(&rid) {
            Some(StagedRecord {
                write: PendingWrite::Delete { .. },
                ..
            }) => Lookup::Deleted,
            Some(staged) => Lookup::Staged(&staged.record),
            None => self.cache.get(&rid).map_or(Lookup::Unknown, Lookup::Cached),
        }
    }

    /// Remembers a record read from storage. The first observed version
    /// sticks for the rest of the transaction.
    pub(crate) fn remember_load(&mut self, record: &Record) {
        self.read_versions.entry(record.rid()).or_insert(record.version());
        if self.cache.len() < self.cache_limit {
            self.cache.insert(record.rid(), record.clone());
        }
    }

    /// Version the transaction observed for a record, if it read it.
    #[must_use]
    pub fn read_version(&self, rid: Rid) -> Option<Version> {
        self.read_versions.get(&rid).copied()
    }

    pub(crate) fn allocate_temporary(&mut self) -> Rid {
        let rid = Rid::temporary(self.next_temporary);
        self.next_temporary += 1;
        rid
    }

    pub(crate) fn contributions(&self, rid: Rid) -> Option<&Contributions> {
        self.contributions.get(&rid)
    }

    pub(crate) fn set_contributions(&mut self, rid: Rid, contributions: Contributions) {
        self.contributions.insert(rid, contributions);
    }

    /// Drops the remembered keys of a cleared index, so later saves add
    /// their keys again.
    pub(crate) fn forget_index(&mut self, index: &str) {
        for contributions in self.contributions.values_mut() {
            contributions.remove(index);
        }
    }

    pub(crate) fn stage(&mut self, record: Record, write: PendingWrite) {
        let rid = record.rid();
        if write == PendingWrite::Create && !self.staged.contains_key(&rid) {
            self.creation_order.push(rid);
        }
        self.cache.remove(&rid);
        self.staged.insert(rid, StagedRecord { record, write });
    }

    /// Forgets a record created in this transaction.
    pub(crate) fn unstage_create(&mut self, rid: Rid) {
        self.staged.remove(&rid);
        self.creation_order.retain(|created| *created != rid);
        self.contributions.remove(&rid);
    }

    pub(crate) fn staged(&self, rid: Rid) -> Option<&StagedRecord> {
        self.staged.get(&rid)
    }

    pub(crate) fn creation_order(&self) -> &[Rid] {
        &self.creation_order
    }

    pub(crate) fn staged_records(&self) -> impl Iterator<Item = (&Rid, &StagedRecord)> {
        self.staged.iter()
    }

    /// Versions every updated or deleted record must still have at commit.
    pub(crate) fn version_checks(&self) -> impl Iterator<Item = (Rid, Version)> + '_ {
        self.staged
            .iter()
            .filter_map(|(rid, staged)| staged.write.expected().map(|expected| (*rid, expected)))
    }

    /// Summarizes what the transaction touches.
    #[must_use]
    pub fn summary(&self) -> TransactionSummary {
        let mut updated = Vec::new();
        let mut deleted = Vec::new();
        for (rid, staged) in &self.staged {
            match staged.write {
                PendingWrite::Create => {}
                PendingWrite::Update { .. } => updated.push(*rid),
                PendingWrite::Delete { .. } => deleted.push(*rid),
            }
        }
        TransactionSummary {
            id: self.id,
            created: self.creation_order.clone(),
            updated,
            deleted,
        }
    }
}
