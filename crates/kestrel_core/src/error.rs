//! Error types for KestrelDB core.

use crate::index::IndexKey;
use crate::listener::{ListenerError, ListenerEvent};
use kestrel_storage::{Rid, StorageError, Version};
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in KestrelDB core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Record store error.
    #[error("storage error: {0}")]
    Storage(#[source] StorageError),

    /// Record body codec error.
    #[error("codec error: {0}")]
    Codec(#[from] kestrel_codec::CodecError),

    /// A record changed after this transaction read it.
    #[error("concurrent modification of {rid}: expected v{expected}, found {}", describe_version(.actual))]
    Conflict {
        /// The record.
        rid: Rid,
        /// Version captured when the record was read.
        expected: Version,
        /// Version stored at commit time, `None` if it was deleted.
        actual: Option<Version>,
    },

    /// A unique index already maps the key to another record.
    #[error("duplicate key {key} in index '{index}': already mapped to {existing}, rejected {rejected}")]
    DuplicateKey {
        /// The index.
        index: String,
        /// The contested key.
        key: IndexKey,
        /// Record the key is mapped to.
        existing: Rid,
        /// Record whose insertion was refused.
        rejected: Rid,
    },

    /// Operation not valid in the current transaction state.
    #[error("transaction state: {message}")]
    TransactionState {
        /// Description of the state problem.
        message: String,
    },

    /// A listener refused a lifecycle event.
    #[error("{event} listener aborted the operation: {source}")]
    ListenerAbort {
        /// The event being dispatched.
        event: ListenerEvent,
        /// Error returned by the listener.
        #[source]
        source: ListenerError,
    },

    /// Record not found.
    #[error("record not found: {rid}")]
    RecordNotFound {
        /// The record.
        rid: Rid,
    },

    /// Class not found.
    #[error("class not found: {name}")]
    ClassNotFound {
        /// Name of the class.
        name: String,
    },

    /// Index not found.
    #[error("index not found: {name}")]
    IndexNotFound {
        /// Name of the index.
        name: String,
    },

    /// A property value cannot be turned into a key of the index.
    #[error("invalid key for index '{index}': {message}")]
    InvalidKey {
        /// The index.
        index: String,
        /// Description of the problem.
        message: String,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },

    /// The session is bound to another thread.
    #[error("session is not active on the current thread")]
    SessionNotActive,

    /// The session was closed.
    #[error("session is closed")]
    SessionClosed,
}

fn describe_version(version: &Option<Version>) -> String {
    match version {
        Some(v) => format!("v{v}"),
        None => "a deleted record".to_string(),
    }
}

impl From<StorageError> for CoreError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::VersionConflict {
                rid,
                expected,
                actual,
            } => Self::Conflict {
                rid,
                expected,
                actual,
            },
            other => Self::Storage(other),
        }
    }
}

impl CoreError {
    /// Creates a transaction state error.
    pub fn transaction_state(message: impl Into<String>) -> Self {
        Self::TransactionState {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates an invalid key error.
    pub fn invalid_key(index: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidKey {
            index: index.into(),
            message: message.into(),
        }
    }

    /// Creates a class not found error.
    pub fn class_not_found(name: impl Into<String>) -> Self {
        Self::ClassNotFound { name: name.into() }
    }

    /// Creates an index not found error.
    pub fn index_not_found(name: impl Into<String>) -> Self {
        Self::IndexNotFound { name: name.into() }
    }

    /// Returns true if repeating the transaction from fresh reads may succeed.
    ///
    /// Only version conflicts qualify. The core never retries by itself.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_conflict_maps_to_conflict() {
        let err: CoreError = StorageError::VersionConflict {
            rid: Rid::new(1, 2),
            expected: 3,
            actual: Some(4),
        }
        .into();
        assert!(matches!(
            err,
            CoreError::Conflict {
                expected: 3,
                actual: Some(4),
                ..
            }
        ));
        assert!(err.is_retryable());
    }

    #[test]
    fn other_storage_errors_are_wrapped() {
        let err: CoreError = StorageError::Closed.into();
        assert!(matches!(err, CoreError::Storage(StorageError::Closed)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn duplicate_key_is_not_retryable() {
        let err = CoreError::DuplicateKey {
            index: "Person.email".into(),
            key: IndexKey::from("a@x"),
            existing: Rid::new(1, 0),
            rejected: Rid::temporary(0),
        };
        assert!(!err.is_retryable());
        assert_eq!(
            err.to_string(),
            "duplicate key \"a@x\" in index 'Person.email': already mapped to #1:0, rejected #-1:-2"
        );
    }

    #[test]
    fn conflict_message_mentions_deletion() {
        let err = CoreError::Conflict {
            rid: Rid::new(2, 5),
            expected: 1,
            actual: None,
        };
        assert_eq!(
            err.to_string(),
            "concurrent modification of #2:5: expected v1, found a deleted record"
        );
    }
}
