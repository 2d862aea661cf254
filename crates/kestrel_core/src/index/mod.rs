//! Secondary indexes.
//!
//! Committed index state is shared by every session and only changes when a
//! transaction commits. Each transaction stages its index changes in an
//! [`IndexOverlay`] and reads through it, so it sees its own writes while
//! other sessions keep seeing committed entries only.
//!
//! # Index Engines
//!
//! - [`BTreeIndex`]: ordered traversal and range queries
//! - [`HashIndex`]: O(1) equality lookup, ranges sorted at scan time
//!
//! Both engines honor identical semantics behind the [`Index`] trait.

mod btree;
mod hash;
mod key;
mod maintainer;
mod overlay;
mod store;
mod traits;

pub use btree::BTreeIndex;
pub use hash::HashIndex;
pub use key::{key_in_range, range_is_empty, IndexKey};
pub use maintainer::{contributions, derive_keys, diff, normalize_key, Contributions, IndexDiff};
pub use overlay::IndexOverlay;
pub use store::{build_engine, CommittedIndexStore, IndexChangeSet};
pub use traits::Index;
