//! # KestrelDB Core
//!
//! Transactional core of KestrelDB, an embedded document and graph store.
//!
//! This crate provides:
//! - Sessions with optimistic transactions and read-your-writes
//! - MVCC version validation at commit
//! - Unique and non-unique secondary indexes (BTree and Hash engines)
//! - A per-transaction index overlay merged into committed state at commit
//! - Session lifecycle listeners
//!
//! ## Example
//!
//! ```rust
//! use kestrel_core::{CoreError, Database, IndexDefinition, PropertyType};
//!
//! let db = Database::open_in_memory().unwrap();
//! db.create_class("Person", None).unwrap();
//! db.create_index(
//!     IndexDefinition::new("Person.email", "Person")
//!         .property("email", PropertyType::String)
//!         .unique(),
//! )
//! .unwrap();
//!
//! let mut session = db.session();
//! session.begin().unwrap();
//! let mut ada = session.new_record("Person").unwrap();
//! ada.set("email", "ada@example.org");
//! session.save(&mut ada).unwrap();
//!
//! let mut copy = session.new_record("Person").unwrap();
//! copy.set("email", "ada@example.org");
//! assert!(matches!(session.save(&mut copy), Err(CoreError::DuplicateKey { .. })));
//!
//! let result = session.commit().unwrap();
//! let rid = result.resolve(ada.rid());
//! assert_eq!(session.index_get("Person.email", "ada@example.org").unwrap(), vec![rid]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod database;
mod error;
pub mod index;
mod listener;
mod mvcc;
mod record;
mod schema;
mod session;
mod stats;
mod transaction;
mod types;

pub use config::Config;
pub use database::Database;
pub use error::{CoreError, CoreResult};
pub use index::{IndexKey, IndexOverlay};
pub use listener::{ListenerError, ListenerEvent, ListenerId, SessionListener};
pub use mvcc::validate_versions;
pub use record::Record;
pub use schema::{
    ClassDefinition, Collate, IndexAlgorithm, IndexDefinition, IndexKind, PropertyType, Schema,
};
pub use session::Session;
pub use stats::{DatabaseStats, StatsSnapshot};
pub use transaction::{CommitResult, PendingWrite, TransactionContext, TransactionSummary};
pub use types::{SessionId, TransactionId};

pub use kestrel_codec::{Document, Value};
pub use kestrel_storage::{InMemoryRecordStore, RecordStore, Rid, Version};
