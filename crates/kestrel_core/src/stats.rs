//! Database statistics.
//!
//! Counters are shared by every session of a database and can be read while
//! transactions are in flight.
//!
//! # Usage
//!
//! ```rust
//! use kestrel_core::Database;
//!
//! let db = Database::open_in_memory().unwrap();
//! let stats = db.stats();
//! assert_eq!(stats.transactions_committed, 0);
//! ```

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Database statistics and metrics.
///
/// All counters are atomic and monotonically increasing.
#[derive(Debug, Default)]
pub struct DatabaseStats {
    // Transaction counters
    transactions_started: AtomicU64,
    transactions_committed: AtomicU64,
    transactions_rolled_back: AtomicU64,

    // Failure counters
    conflicts: AtomicU64,
    duplicate_keys: AtomicU64,
    listener_aborts: AtomicU64,

    // Record counters
    records_created: AtomicU64,
    records_updated: AtomicU64,
    records_deleted: AtomicU64,
    records_loaded: AtomicU64,

    index_lookups: AtomicU64,
    truncations: AtomicU64,
}

impl DatabaseStats {
    /// Creates a new stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_transaction_start(&self) {
        self.transactions_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_commit(&self, created: usize, updated: usize, deleted: usize) {
        self.transactions_committed.fetch_add(1, Ordering::Relaxed);
        self.records_created
            .fetch_add(created as u64, Ordering::Relaxed);
        self.records_updated
            .fetch_add(updated as u64, Ordering::Relaxed);
        self.records_deleted
            .fetch_add(deleted as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_rollback(&self) {
        self.transactions_rolled_back.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_conflict(&self) {
        self.conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_duplicate_key(&self) {
        self.duplicate_keys.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_listener_abort(&self) {
        self.listener_aborts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_load(&self) {
        self.records_loaded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_index_lookup(&self) {
        self.index_lookups.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_truncation(&self) {
        self.truncations.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the total number of transactions started.
    pub fn transactions_started(&self) -> u64 {
        self.transactions_started.load(Ordering::Relaxed)
    }

    /// Returns the total number of transactions committed.
    pub fn transactions_committed(&self) -> u64 {
        self.transactions_committed.load(Ordering::Relaxed)
    }

    /// Returns the total number of transactions rolled back, including
    /// commits that failed.
    pub fn transactions_rolled_back(&self) -> u64 {
        self.transactions_rolled_back.load(Ordering::Relaxed)
    }

    /// Returns the number of commits refused for a stale version.
    pub fn conflicts(&self) -> u64 {
        self.conflicts.load(Ordering::Relaxed)
    }

    /// Returns the number of unique-key violations reported.
    pub fn duplicate_keys(&self) -> u64 {
        self.duplicate_keys.load(Ordering::Relaxed)
    }

    /// Returns a snapshot of all stats.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            transactions_started: self.transactions_started(),
            transactions_committed: self.transactions_committed(),
            transactions_rolled_back: self.transactions_rolled_back(),
            conflicts: self.conflicts(),
            duplicate_keys: self.duplicate_keys(),
            listener_aborts: self.listener_aborts.load(Ordering::Relaxed),
            records_created: self.records_created.load(Ordering::Relaxed),
            records_updated: self.records_updated.load(Ordering::Relaxed),
            records_deleted: self.records_deleted.load(Ordering::Relaxed),
            records_loaded: self.records_loaded.load(Ordering::Relaxed),
            index_lookups: self.index_lookups.load(Ordering::Relaxed),
            truncations: self.truncations.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of database statistics.
///
/// Unlike `DatabaseStats`, this is a plain struct that can be serialized,
/// compared, or passed across threads without atomics.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Transactions started.
    pub transactions_started: u64,
    /// Transactions committed.
    pub transactions_committed: u64,
    /// Transactions rolled back, including failed commits.
    pub transactions_rolled_back: u64,
    /// Commits refused for a stale version.
    pub conflicts: u64,
    /// Unique-key violations.
    pub duplicate_keys: u64,
    /// Operations refused by a listener.
    pub listener_aborts: u64,
    /// Records created by committed transactions.
    pub records_created: u64,
    /// Records updated by committed transactions.
    pub records_updated: u64,
    /// Records deleted by committed transactions.
    pub records_deleted: u64,
    /// Records loaded from storage.
    pub records_loaded: u64,
    /// Index lookups, range scans and size queries.
    pub index_lookups: u64,
    /// Class truncations.
    pub truncations: u64,
}
