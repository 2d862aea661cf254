//! # Kestrel Storage
//!
//! The record storage layer consumed by the KestrelDB transactional core.
//!
//! Record stores are **opaque versioned byte stores**: they map a record
//! identity to an encoded body and a version number, and refuse writes whose
//! expected version is stale. They know nothing about classes, documents or
//! indexes.
//!
//! ## Design Principles
//!
//! - Versions start at 0 and grow by exactly 1 per update
//! - A batch of writes is validated as a whole before any write is applied
//! - Identities are allocated per collection and never reused
//! - Stores must be `Send + Sync` and take `&self` everywhere
//!
//! ## Available Stores
//!
//! - [`InMemoryRecordStore`] - For testing and ephemeral databases
//!
//! ## Example
//!
//! ```rust
//! use kestrel_storage::{InMemoryRecordStore, RecordStore, StorageError};
//!
//! let store = InMemoryRecordStore::new();
//! let rid = store.allocate_identity(0).unwrap();
//! store.write_record(rid, b"v0", None).unwrap();
//! store.write_record(rid, b"v1", Some(0)).unwrap();
//!
//! let stale = store.write_record(rid, b"lost", Some(0));
//! assert!(matches!(stale, Err(StorageError::VersionConflict { .. })));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod memory;
mod rid;
mod store;

pub use error::{StorageError, StorageResult};
pub use memory::InMemoryRecordStore;
pub use rid::{Rid, TEMPORARY_COLLECTION};
pub use store::{RecordStore, RecordWrite, StoredRecord, Version, WriteOutcome};
