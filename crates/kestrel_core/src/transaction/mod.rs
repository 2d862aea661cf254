//! Optimistic transactions.
//!
//! A transaction stages record writes and index changes privately:
//! - **Isolation**: other sessions see committed state only
//! - **Read-your-writes**: loads and index reads inside the transaction see
//!   its own staged changes
//! - **Atomicity**: records and indexes change together at commit, or not
//!   at all
//!
//! Conflicts are detected at commit by comparing the versions a transaction
//! observed with the versions stored at that moment.

mod commit;
mod context;

pub(crate) use commit::commit;
pub use commit::CommitResult;
pub(crate) use context::Lookup;
pub use context::{PendingWrite, TransactionContext, TransactionSummary};
