//! Records: a document with an identity, a class and a version.

use kestrel_codec::{Document, Value};
use kestrel_storage::{Rid, Version};

/// A record as seen by a session.
///
/// Records are plain values. A session hands out copies; changes become
/// visible to the session only through [`Session::save`], and to other
/// sessions only once the transaction commits.
///
/// [`Session::save`]: crate::Session::save
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    rid: Rid,
    class: String,
    version: Version,
    document: Document,
    dirty: bool,
}

impl Record {
    pub(crate) fn new(class: impl Into<String>) -> Self {
        Self {
            rid: Rid::UNASSIGNED,
            class: class.into(),
            version: 0,
            document: Document::new(),
            dirty: true,
        }
    }

    pub(crate) fn loaded(rid: Rid, class: impl Into<String>, version: Version, document: Document) -> Self {
        Self {
            rid,
            class: class.into(),
            version,
            document,
            dirty: false,
        }
    }

    /// Returns the record identity.
    ///
    /// Unsaved records report [`Rid::UNASSIGNED`]; records created in an open
    /// transaction report a temporary identity until commit.
    #[must_use]
    pub fn rid(&self) -> Rid {
        self.rid
    }

    /// Returns the class name.
    #[must_use]
    pub fn class(&self) -> &str {
        &self.class
    }

    /// Returns the version this copy was read at.
    #[must_use]
    pub fn version(&self) -> Version {
        self.version
    }

    /// Returns the property map.
    #[must_use]
    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Returns a property value.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.document.get(name)
    }

    /// Sets a property, returning the previous value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.dirty = true;
        self.document.set(name, value)
    }

    /// Removes a property, returning its value.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let previous = self.document.remove(name);
        if previous.is_some() {
            self.dirty = true;
        }
        previous
    }

    /// Returns a link value pointing at this record.
    ///
    /// Links to records created in an open transaction hold the temporary
    /// identity and are rewritten when the transaction commits.
    #[must_use]
    pub fn link(&self) -> Value {
        let (collection, position) = self.rid.as_link();
        Value::Link(collection, position)
    }

    /// Returns true if the record changed since it was loaded or saved.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Returns true if the record has never been committed.
    #[must_use]
    pub fn is_new(&self) -> bool {
        !self.rid.is_persistent()
    }

    pub(crate) fn document_mut(&mut self) -> &mut Document {
        &mut self.document
    }

    pub(crate) fn set_rid(&mut self, rid: Rid) {
        self.rid = rid;
    }

    pub(crate) fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    pub(crate) fn mark_clean(&mut self) {
        self.dirty = false;
    }
}
