//! Index keys.

use kestrel_codec::Value;
use kestrel_storage::Rid;
use std::fmt;
use std::ops::Bound;

/// A single or composite index key.
///
/// Keys compare lexicographically, component by component, using the
/// natural order of [`Value`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IndexKey(Vec<Value>);

impl IndexKey {
    /// Creates a single-component key.
    pub fn single(value: impl Into<Value>) -> Self {
        Self(vec![value.into()])
    }

    /// Creates a composite key from its components in definition order.
    pub fn composite(components: Vec<Value>) -> Self {
        Self(components)
    }

    /// Returns the key components.
    #[must_use]
    pub fn components(&self) -> &[Value] {
        &self.0
    }

    /// Returns true if any component is null.
    #[must_use]
    pub fn has_null(&self) -> bool {
        self.0.iter().any(Value::is_null)
    }

    /// Returns true if a component links to a temporary record identity.
    pub(crate) fn links_temporary(&self) -> bool {
        self.0
            .iter()
            .any(|v| matches!(v.as_link(), Some(link) if Rid::from_link(link).is_temporary()))
    }

    /// Rewrites link components through `remap`.
    pub(crate) fn remap_links(&mut self, remap: &dyn Fn(Rid) -> Option<Rid>) {
        for component in &mut self.0 {
            component.visit_links_mut(&mut |collection, position| {
                if let Some(target) = remap(Rid::new(*collection, *position)) {
                    (*collection, *position) = target.as_link();
                }
            });
        }
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.as_slice() {
            [single] => write!(f, "{single}"),
            components => {
                write!(f, "[")?;
                for (i, component) in components.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{component}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<Value> for IndexKey {
    fn from(value: Value) -> Self {
        Self::single(value)
    }
}

impl From<i64> for IndexKey {
    fn from(value: i64) -> Self {
        Self::single(value)
    }
}

impl From<&str> for IndexKey {
    fn from(value: &str) -> Self {
        Self::single(value)
    }
}

impl From<String> for IndexKey {
    fn from(value: String) -> Self {
        Self::single(value)
    }
}

impl From<bool> for IndexKey {
    fn from(value: bool) -> Self {
        Self::single(value)
    }
}

impl From<Rid> for IndexKey {
    fn from(rid: Rid) -> Self {
        let (collection, position) = rid.as_link();
        Self::single(Value::Link(collection, position))
    }
}

impl From<Vec<Value>> for IndexKey {
    fn from(components: Vec<Value>) -> Self {
        Self::composite(components)
    }
}

/// Returns true if `key` lies within the bounds.
pub fn key_in_range(key: &IndexKey, from: Bound<&IndexKey>, to: Bound<&IndexKey>) -> bool {
    let above = match from {
        Bound::Included(lo) => key >= lo,
        Bound::Excluded(lo) => key > lo,
        Bound::Unbounded => true,
    };
    let below = match to {
        Bound::Included(hi) => key <= hi,
        Bound::Excluded(hi) => key < hi,
        Bound::Unbounded => true,
    };
    above && below
}

/// Returns true if no key can satisfy the bounds.
///
/// `BTreeMap::range` panics on such bounds, so callers check first.
pub fn range_is_empty(from: Bound<&IndexKey>, to: Bound<&IndexKey>) -> bool {
    match (from, to) {
        (Bound::Included(lo), Bound::Included(hi)) => lo > hi,
        (Bound::Included(lo), Bound::Excluded(hi))
        | (Bound::Excluded(lo), Bound::Included(hi))
        | (Bound::Excluded(lo), Bound::Excluded(hi)) => lo >= hi,
        _ => false,
    }
}
