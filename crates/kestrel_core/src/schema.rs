//! Minimal schema registry: classes, their collections and index definitions.

use crate::error::{CoreError, CoreResult};
use std::collections::{BTreeMap, HashMap};

/// Type an indexed property is coerced to when keys are derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyType {
    /// 64-bit integer. Numeric text is accepted and parsed.
    Integer,
    /// Text. Integers are accepted and rendered.
    String,
    /// Boolean.
    Boolean,
    /// Raw bytes.
    Binary,
    /// Link to another record.
    Link,
}

/// Uniqueness mode of an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexKind {
    /// At most one record per key.
    Unique,
    /// Any number of records per key.
    NotUnique,
}

/// Engine backing an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IndexAlgorithm {
    /// Ordered tree; range scans walk the tree.
    #[default]
    BTree,
    /// Hash table; range scans sort at scan time.
    Hash,
}

/// Collation applied to text key components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Collate {
    /// Compare text as stored.
    #[default]
    Default,
    /// Compare text lowercased.
    CaseInsensitive,
}

/// Definition of a secondary index.
///
/// # Example
///
/// ```rust
/// use kestrel_core::{IndexDefinition, PropertyType};
///
/// let index = IndexDefinition::new("Person.email", "Person")
///     .property("email", PropertyType::String)
///     .unique()
///     .case_insensitive();
/// assert!(index.is_unique());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDefinition {
    /// Index name, unique within the database.
    pub name: String,
    /// Class the index is declared on. Subclasses inherit it.
    pub class: String,
    /// Indexed properties in key order.
    pub properties: Vec<(String, PropertyType)>,
    /// Uniqueness mode.
    pub kind: IndexKind,
    /// Backing engine.
    pub algorithm: IndexAlgorithm,
    /// Skip keys with a null component instead of indexing them.
    pub ignore_null_values: bool,
    /// Text collation.
    pub collate: Collate,
}

impl IndexDefinition {
    /// Creates a non-unique B-tree index definition with no properties.
    pub fn new(name: impl Into<String>, class: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            class: class.into(),
            properties: Vec::new(),
            kind: IndexKind::NotUnique,
            algorithm: IndexAlgorithm::BTree,
            ignore_null_values: true,
            collate: Collate::Default,
        }
    }

    /// Appends an indexed property.
    #[must_use]
    pub fn property(mut self, name: impl Into<String>, ty: PropertyType) -> Self {
        self.properties.push((name.into(), ty));
        self
    }

    /// Makes this a unique index.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.kind = IndexKind::Unique;
        self
    }

    /// Backs this index with a hash table.
    #[must_use]
    pub fn hash(mut self) -> Self {
        self.algorithm = IndexAlgorithm::Hash;
        self
    }

    /// Indexes keys with null components instead of skipping them.
    #[must_use]
    pub fn index_nulls(mut self) -> Self {
        self.ignore_null_values = false;
        self
    }

    /// Lowercases text components.
    #[must_use]
    pub fn case_insensitive(mut self) -> Self {
        self.collate = Collate::CaseInsensitive;
        self
    }

    /// Returns true for a unique index.
    #[must_use]
    pub fn is_unique(&self) -> bool {
        self.kind == IndexKind::Unique
    }

    /// Returns true if the key has more than one component.
    #[must_use]
    pub fn is_composite(&self) -> bool {
        self.properties.len() > 1
    }
}

/// A class: a named record type stored in one or more collections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDefinition {
    /// Class name.
    pub name: String,
    /// Direct superclass.
    pub superclass: Option<String>,
    /// Storage collections owned by the class.
    pub collections: Vec<i32>,
}

/// The schema registry.
#[derive(Debug, Default)]
pub struct Schema {
    classes: BTreeMap<String, ClassDefinition>,
    indexes: BTreeMap<String, IndexDefinition>,
    collection_owners: HashMap<i32, String>,
}

impl Schema {
    /// Creates an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a class.
    ///
    /// # Errors
    ///
    /// Fails if the class exists, the superclass is unknown, no collection
    /// is given, or a collection already belongs to another class.
    pub fn create_class(
        &mut self,
        name: &str,
        superclass: Option<&str>,
        collections: Vec<i32>,
    ) -> CoreResult<&ClassDefinition> {
        if self.classes.contains_key(name) {
            return Err(CoreError::invalid_operation(format!(
                "class '{name}' already exists"
            )));
        }
        if let Some(parent) = superclass {
            if !self.classes.contains_key(parent) {
                return Err(CoreError::class_not_found(parent));
            }
        }
        if collections.is_empty() {
            return Err(CoreError::invalid_operation(format!(
                "class '{name}' needs at least one collection"
            )));
        }
        if let Some(taken) = collections
            .iter()
            .find(|c| self.collection_owners.contains_key(c))
        {
            return Err(CoreError::invalid_operation(format!(
                "collection {taken} already belongs to class '{}'",
                self.collection_owners[taken]
            )));
        }

        for collection in &collections {
            self.collection_owners.insert(*collection, name.to_string());
        }
        let class = ClassDefinition {
            name: name.to_string(),
            superclass: superclass.map(str::to_string),
            collections,
        };
        Ok(&*self.classes.entry(name.to_string()).or_insert(class))
    }

    /// Returns a class definition.
    pub fn class(&self, name: &str) -> Option<&ClassDefinition> {
        self.classes.get(name)
    }

    /// Returns a class definition or `ClassNotFound`.
    ///
    /// # Errors
    ///
    /// Fails if the class does not exist.
    pub fn require_class(&self, name: &str) -> CoreResult<&ClassDefinition> {
        self.class(name)
            .ok_or_else(|| CoreError::class_not_found(name))
    }

    /// Returns every class name.
    pub fn class_names(&self) -> impl Iterator<Item = &str> {
        self.classes.keys().map(String::as_str)
    }

    /// Returns the class that owns a collection.
    pub fn class_for_collection(&self, collection_id: i32) -> Option<&str> {
        self.collection_owners
            .get(&collection_id)
            .map(String::as_str)
    }

    /// Returns true if `class` is `ancestor` or inherits from it.
    pub fn is_subclass_of(&self, class: &str, ancestor: &str) -> bool {
        let mut current = Some(class);
        while let Some(name) = current {
            if name == ancestor {
                return true;
            }
            current = self
                .classes
                .get(name)
                .and_then(|c| c.superclass.as_deref());
        }
        false
    }

    /// Returns `name` followed by every class inheriting from it.
    pub fn class_and_subclasses(&self, name: &str) -> Vec<&str> {
        let mut out = vec![];
        if let Some(class) = self.classes.get(name) {
            out.push(class.name.as_str());
        }
        out.extend(
            self.classes
                .keys()
                .map(String::as_str)
                .filter(|c| *c != name && self.is_subclass_of(c, name)),
        );
        out
    }

    /// Returns every index that applies to records of `class`, including
    /// indexes declared on its superclasses.
    pub fn indexes_for_class(&self, class: &str) -> Vec<&IndexDefinition> {
        self.indexes
            .values()
            .filter(|index| self.is_subclass_of(class, &index.class))
            .collect()
    }

    /// Returns an index definition.
    pub fn index(&self, name: &str) -> Option<&IndexDefinition> {
        self.indexes.get(name)
    }

    /// Returns every index definition.
    pub fn indexes(&self) -> impl Iterator<Item = &IndexDefinition> {
        self.indexes.values()
    }

    /// Validates and registers an index definition.
    ///
    /// # Errors
    ///
    /// Fails if the name is taken, the class is unknown or no property is
    /// given.
    pub fn add_index(&mut self, index: IndexDefinition) -> CoreResult<()> {
        self.validate_index(&index)?;
        self.indexes.insert(index.name.clone(), index);
        Ok(())
    }

    /// Checks an index definition without registering it.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Schema::add_index`].
    pub fn validate_index(&self, index: &IndexDefinition) -> CoreResult<()> {
        if self.indexes.contains_key(&index.name) {
            return Err(CoreError::invalid_operation(format!(
                "index '{}' already exists",
                index.name
            )));
        }
        self.require_class(&index.class)?;
        if index.properties.is_empty() {
            return Err(CoreError::invalid_key(
                &index.name,
                "an index needs at least one property",
            ));
        }
        Ok(())
    }

    /// Removes an index definition.
    ///
    /// # Errors
    ///
    /// Fails if the index does not exist.
    pub fn drop_index(&mut self, name: &str) -> CoreResult<IndexDefinition> {
        self.indexes
            .remove(name)
            .ok_or_else(|| CoreError::index_not_found(name))
    }
}
