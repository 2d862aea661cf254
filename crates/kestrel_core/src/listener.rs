//! Session lifecycle listeners.
//!
//! Listeners are registered on a [`Session`](crate::Session) and fire in
//! registration order. "Before" callbacks may refuse the operation by
//! returning an error; the first refusal stops the remaining "before"
//! callbacks of that event. "After" callbacks observe only.

use crate::transaction::{CommitResult, TransactionSummary};
use crate::types::{SessionId, TransactionId};
use std::fmt;
use std::sync::Arc;

/// Error a listener returns to refuse an operation.
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

/// Lifecycle event a listener is notified of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerEvent {
    /// A transaction is about to begin.
    BeforeBegin,
    /// A transaction is about to commit.
    BeforeCommit,
    /// A transaction committed.
    AfterCommit,
    /// A transaction is about to roll back.
    BeforeRollback,
    /// A transaction rolled back.
    AfterRollback,
    /// The session is closing.
    Close,
}

impl fmt::Display for ListenerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::BeforeBegin => "before-begin",
            Self::BeforeCommit => "before-commit",
            Self::AfterCommit => "after-commit",
            Self::BeforeRollback => "before-rollback",
            Self::AfterRollback => "after-rollback",
            Self::Close => "close",
        };
        f.write_str(name)
    }
}

/// Callbacks for session lifecycle events.
///
/// Every method has a no-op default, so implementors only override the
/// events they care about.
///
/// # Example
///
/// ```rust
/// use kestrel_core::{ListenerError, SessionListener, TransactionSummary};
///
/// struct ReadOnly;
///
/// impl SessionListener for ReadOnly {
///     fn before_commit(&self, tx: &TransactionSummary) -> Result<(), ListenerError> {
///         if tx.is_empty() {
///             Ok(())
///         } else {
///             Err("this session is read-only".into())
///         }
///     }
/// }
/// ```
pub trait SessionListener: Send + Sync {
    /// Called before a transaction begins. An error prevents it.
    fn before_begin(&self, _session: SessionId) -> Result<(), ListenerError> {
        Ok(())
    }

    /// Called before a transaction commits. An error rolls it back.
    fn before_commit(&self, _tx: &TransactionSummary) -> Result<(), ListenerError> {
        Ok(())
    }

    /// Called after a transaction committed, with final identities.
    fn after_commit(&self, _result: &CommitResult) {}

    /// Called before a transaction rolls back.
    ///
    /// An error is reported to the caller once the rollback has completed;
    /// it cannot keep the transaction alive.
    fn before_rollback(&self, _tx: &TransactionSummary) -> Result<(), ListenerError> {
        Ok(())
    }

    /// Called after a transaction rolled back.
    fn after_rollback(&self, _tx: TransactionId) {}

    /// Called when the session closes.
    fn on_close(&self, _session: SessionId) {}
}

/// Handle returned by listener registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Ordered listener list of one session.
#[derive(Default)]
pub(crate) struct ListenerRegistry {
    next_id: u64,
    listeners: Vec<(ListenerId, Arc<dyn SessionListener>)>,
}

impl ListenerRegistry {
    pub(crate) fn register(&mut self, listener: Arc<dyn SessionListener>) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.listeners.push((id, listener));
        id
    }

    pub(crate) fn unregister(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(registered, _)| *registered != id);
        self.listeners.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        self.listeners.len()
    }

    fn each(&self) -> impl Iterator<Item = &Arc<dyn SessionListener>> {
        self.listeners.iter().map(|(_, listener)| listener)
    }

    pub(crate) fn before_begin(&self, session: SessionId) -> Result<(), ListenerError> {
        self.each().try_for_each(|l| l.before_begin(session))
    }

    pub(crate) fn before_commit(&self, tx: &TransactionSummary) -> Result<(), ListenerError> {
        self.each().try_for_each(|l| l.before_commit(tx))
    }

    pub(crate) fn after_commit(&self, result: &CommitResult) {
        self.each().for_each(|l| l.after_commit(result));
    }

    pub(crate) fn before_rollback(&self, tx: &TransactionSummary) -> Result<(), ListenerError> {
        self.each().try_for_each(|l| l.before_rollback(tx))
    }

    pub(crate) fn after_rollback(&self, tx: TransactionId) {
        self.each().for_each(|l| l.after_rollback(tx));
    }

    pub(crate) fn on_close(&self, session: SessionId) {
        self.each().for_each(|l| l.on_close(session));
    }
}
