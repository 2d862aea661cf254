//! Record identifiers.

use std::fmt;

/// Collection id used by records that have not been committed yet.
pub const TEMPORARY_COLLECTION: i32 = -1;

/// Stable record identifier: a collection id and a position inside it.
///
/// Records created inside an open transaction carry a *temporary* identity
/// (collection [`TEMPORARY_COLLECTION`], position `<= -2`) until commit
/// assigns the durable one. `#-1:-1` is reserved for records that have no
/// identity at all yet.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Rid {
    collection_id: i32,
    position: i64,
}

impl Rid {
    /// Identity of a record that was never saved.
    pub const UNASSIGNED: Rid = Rid {
        collection_id: TEMPORARY_COLLECTION,
        position: -1,
    };

    /// Creates a record id.
    #[must_use]
    pub const fn new(collection_id: i32, position: i64) -> Self {
        Self {
            collection_id,
            position,
        }
    }

    /// Creates the `n`-th temporary identity of a transaction.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub const fn temporary(n: u64) -> Self {
        Self {
            collection_id: TEMPORARY_COLLECTION,
            position: -2 - (n as i64),
        }
    }

    /// Returns the collection id.
    #[must_use]
    pub const fn collection_id(self) -> i32 {
        self.collection_id
    }

    /// Returns the position inside the collection.
    #[must_use]
    pub const fn position(self) -> i64 {
        self.position
    }

    /// Returns true for the unassigned identity.
    #[must_use]
    pub const fn is_unassigned(self) -> bool {
        self.collection_id == Self::UNASSIGNED.collection_id
            && self.position == Self::UNASSIGNED.position
    }

    /// Returns true for a transaction-local placeholder identity.
    #[must_use]
    pub const fn is_temporary(self) -> bool {
        self.collection_id < 0 && self.position < -1
    }

    /// Returns true for an identity assigned by storage.
    #[must_use]
    pub const fn is_persistent(self) -> bool {
        self.collection_id >= 0 && self.position >= 0
    }

    /// Returns the `(collection, position)` pair, as carried by link values.
    #[must_use]
    pub const fn as_link(self) -> (i32, i64) {
        (self.collection_id, self.position)
    }

    /// Builds a record id from a link pair.
    #[must_use]
    pub const fn from_link((collection_id, position): (i32, i64)) -> Self {
        Self::new(collection_id, position)
    }
}

impl fmt::Debug for Rid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rid(#{}:{})", self.collection_id, self.position)
    }
}

impl fmt::Display for Rid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}:{}", self.collection_id, self.position)
    }
}
