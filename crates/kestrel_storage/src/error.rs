//! Error types for storage operations.

use crate::rid::Rid;
use crate::store::Version;
use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The stored version differs from the version the caller expected.
    #[error("version conflict on {rid}: expected v{expected}, found {}", describe_version(.actual))]
    VersionConflict {
        /// The record.
        rid: Rid,
        /// Version the caller expected.
        expected: Version,
        /// Version actually stored, `None` if the record is gone.
        actual: Option<Version>,
    },

    /// A create targeted an identity that is already in use.
    #[error("record {rid} already exists")]
    RecordExists {
        /// The record.
        rid: Rid,
    },

    /// The identity is not one storage can hold (temporary or unassigned).
    #[error("invalid record identity {rid}")]
    InvalidIdentity {
        /// The rejected identity.
        rid: Rid,
    },

    /// Storage is closed.
    #[error("storage is closed")]
    Closed,
}

fn describe_version(version: &Option<Version>) -> String {
    match version {
        Some(v) => format!("v{v}"),
        None => "no record".to_string(),
    }
}

impl StorageError {
    /// Returns true if this error reports a stale expected version.
    #[must_use]
    pub fn is_version_conflict(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }
}
