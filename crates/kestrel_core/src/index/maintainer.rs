//! Index key derivation and per-record index diffs.

use crate::error::{CoreError, CoreResult};
use crate::index::key::IndexKey;
use crate::schema::{Collate, IndexDefinition, PropertyType};
use kestrel_codec::{Document, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Keys a record contributes, per index name.
pub type Contributions = BTreeMap<String, BTreeSet<IndexKey>>;

/// The index entries one save adds and removes for one record.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IndexDiff {
    /// Index name.
    pub index: String,
    /// Keys the record no longer contributes.
    pub removes: Vec<IndexKey>,
    /// Keys the record starts contributing.
    pub adds: Vec<IndexKey>,
}

fn coerce(index: &IndexDefinition, property: &str, ty: PropertyType, value: &Value) -> CoreResult<Value> {
    let coerced = match (ty, value) {
        (_, Value::Null) => Some(Value::Null),
        (PropertyType::Integer, Value::Integer(_))
        | (PropertyType::Boolean, Value::Bool(_))
        | (PropertyType::Binary, Value::Bytes(_))
        | (PropertyType::Link, Value::Link(..)) => Some(value.clone()),
        (PropertyType::Integer, Value::Text(text)) => text.trim().parse::<i64>().ok().map(Value::Integer),
        (PropertyType::String, Value::Text(text)) => Some(Value::Text(match index.collate {
            Collate::Default => text.clone(),
            Collate::CaseInsensitive => text.to_lowercase(),
        })),
        (PropertyType::String, Value::Integer(n)) => Some(Value::Text(n.to_string())),
        _ => None,
    };
    coerced.ok_or_else(|| {
        CoreError::invalid_key(
            &index.name,
            format!("property '{property}' holds {value}, which is not a valid {ty:?} key"),
        )
    })
}

/// Derives the keys a document contributes to an index.
///
/// A single-property index yields one key per distinct element when the
/// property holds an array. Composite keys take one value per property, in
/// definition order. With `ignore_null_values`, keys with a null component
/// are skipped; a missing property counts as null.
///
/// # Errors
///
/// Returns `InvalidKey` if a value cannot be coerced to the property type,
/// or if a composite component holds an array.
pub fn derive_keys(index: &IndexDefinition, document: &Document) -> CoreResult<BTreeSet<IndexKey>> {
    let mut keys = BTreeSet::new();
    match index.properties.as_slice() {
        [(property, ty)] => {
            let value = document.get(property).unwrap_or(&Value::Null);
            match value {
                Value::Array(items) if !items.is_empty() => {
                    for item in items {
                        keys.insert(IndexKey::single(coerce(index, property, *ty, item)?));
                    }
                }
                Value::Array(_) => {
                    keys.insert(IndexKey::single(Value::Null));
                }
                other => {
                    keys.insert(IndexKey::single(coerce(index, property, *ty, other)?));
                }
            }
        }
        properties => {
            let mut components = Vec::with_capacity(properties.len());
            for (property, ty) in properties {
                let value = document.get(property).unwrap_or(&Value::Null);
                if matches!(value, Value::Array(_)) {
                    return Err(CoreError::invalid_key(
                        &index.name,
                        format!("property '{property}' holds an array, which cannot be part of a composite key"),
                    ));
                }
                components.push(coerce(index, property, *ty, value)?);
            }
            keys.insert(IndexKey::composite(components));
        }
    }
    if index.ignore_null_values {
        keys.retain(|key| !key.has_null());
    }
    Ok(keys)
}

/// Brings a key supplied by a query into the form keys are stored in: each
/// component is coerced to its property type and collated.
///
/// A key may name fewer components than the index has properties, which
/// range scans use as a prefix bound. Returns `None` if a component cannot
/// be coerced or the key has too many components; no stored key can match.
pub fn normalize_key(index: &IndexDefinition, key: IndexKey) -> Option<IndexKey> {
    if key.components().len() > index.properties.len() {
        return None;
    }
    let components = key
        .components()
        .iter()
        .zip(&index.properties)
        .map(|(component, (property, ty))| coerce(index, property, *ty, component).ok())
        .collect::<Option<Vec<_>>>()?;
    Some(IndexKey::composite(components))
}

/// Derives the keys a document contributes to every given index.
///
/// # Errors
///
/// Returns the first key derivation error.
pub fn contributions<'a, I>(indexes: I, document: &Document) -> CoreResult<Contributions>
where
    I: IntoIterator<Item = &'a IndexDefinition>,
{
    indexes
        .into_iter()
        .map(|index| Ok((index.name.clone(), derive_keys(index, document)?)))
        .collect()
}

/// Computes the entries to remove and add when a record's contributions
/// change from `old` to `new`. Indexes with no change are omitted.
pub fn diff(old: &Contributions, new: &Contributions) -> Vec<IndexDiff> {
    let empty = BTreeSet::new();
    let names: BTreeSet<&String> = old.keys().chain(new.keys()).collect();
    names
        .into_iter()
        .filter_map(|name| {
            let before = old.get(name).unwrap_or(&empty);
            let after = new.get(name).unwrap_or(&empty);
            let diff = IndexDiff {
                index: name.clone(),
                removes: before.difference(after).cloned().collect(),
                adds: after.difference(before).cloned().collect(),
            };
            (!diff.removes.is_empty() || !diff.adds.is_empty()).then_some(diff)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(pairs: &[(&str, Value)]) -> Document {
        pairs.iter().cloned().collect()
    }

    fn email_index() -> IndexDefinition {
        IndexDefinition::new("Person.email", "Person").property("email", PropertyType::String)
    }

    fn keys(values: &[IndexKey]) -> BTreeSet<IndexKey> {
        values.iter().cloned().collect()
    }

    #[test]
    fn single_property_key() {
        let found = derive_keys(&email_index(), &doc(&[("email", "a@x".into())])).unwrap();
        assert_eq!(found, keys(&[IndexKey::from("a@x")]));
    }

    #[test]
    fn missing_property_is_skipped_by_default() {
        assert!(derive_keys(&email_index(), &Document::new()).unwrap().is_empty());
    }

    #[test]
    fn null_keys_can_be_indexed() {
        let found = derive_keys(&email_index().index_nulls(), &Document::new()).unwrap();
        assert_eq!(found, keys(&[IndexKey::single(Value::Null)]));
    }

    #[test]
    fn array_yields_one_key_per_distinct_element() {
        let tags = IndexDefinition::new("Post.tags", "Post").property("tags", PropertyType::String);
        let document = doc(&[(
            "tags",
            Value::Array(vec!["rust".into(), "db".into(), "rust".into()]),
        )]);
        let found = derive_keys(&tags, &document).unwrap();
        assert_eq!(found, keys(&[IndexKey::from("db"), IndexKey::from("rust")]));
    }

    #[test]
    fn composite_key_in_definition_order() {
        let name = IndexDefinition::new("Person.name", "Person")
            .property("last", PropertyType::String)
            .property("first", PropertyType::String);
        let found = derive_keys(&name, &doc(&[("first", "Ada".into()), ("last", "Lovelace".into())])).unwrap();
        assert_eq!(
            found,
            keys(&[IndexKey::composite(vec!["Lovelace".into(), "Ada".into()])])
        );
    }

    #[test]
    fn composite_with_null_component_is_skipped() {
        let name = IndexDefinition::new("Person.name", "Person")
            .property("last", PropertyType::String)
            .property("first", PropertyType::String);
        assert!(derive_keys(&name, &doc(&[("last", "Lovelace".into())])).unwrap().is_empty());
    }

    #[test]
    fn coercion_rules() {
        let age = IndexDefinition::new("Person.age", "Person").property("age", PropertyType::Integer);
        let found = derive_keys(&age, &doc(&[("age", " 42 ".into())])).unwrap();
        assert_eq!(found, keys(&[IndexKey::from(42i64)]));

        let err = derive_keys(&age, &doc(&[("age", "forty".into())])).unwrap_err();
        assert!(matches!(err, CoreError::InvalidKey { .. }));

        let rendered = derive_keys(&email_index(), &doc(&[("email", 7i64.into())])).unwrap();
        assert_eq!(rendered, keys(&[IndexKey::from("7")]));

        let flag = IndexDefinition::new("Person.active", "Person").property("active", PropertyType::Boolean);
        assert!(derive_keys(&flag, &doc(&[("active", 1i64.into())])).is_err());
    }

    #[test]
    fn case_insensitive_collation_lowercases() {
        let index = email_index().case_insensitive();
        let found = derive_keys(&index, &doc(&[("email", "Ada@X.org".into())])).unwrap();
        assert_eq!(found, keys(&[IndexKey::from("ada@x.org")]));
    }

    #[test]
    fn query_keys_follow_collation() {
        let key = IndexKey::from("Ada@X.org");
        assert_eq!(normalize_key(&email_index(), key.clone()), Some(key));
        assert_eq!(
            normalize_key(&email_index().case_insensitive(), IndexKey::from("Ada@X.org")),
            Some(IndexKey::from("ada@x.org"))
        );
    }

    #[test]
    fn query_keys_are_coerced_like_stored_keys() {
        let age = IndexDefinition::new("Person.age", "Person").property("age", PropertyType::Integer);
        assert_eq!(normalize_key(&age, IndexKey::from(" 30")), Some(IndexKey::from(30i64)));
        assert_eq!(normalize_key(&age, IndexKey::from("thirty")), None);
        assert_eq!(normalize_key(&email_index(), IndexKey::from(7i64)), Some(IndexKey::from("7")));

        let name = IndexDefinition::new("Person.name", "Person")
            .property("last", PropertyType::String)
            .property("first", PropertyType::String);
        assert_eq!(normalize_key(&name, IndexKey::from("Lovelace")), Some(IndexKey::from("Lovelace")));
        assert_eq!(
            normalize_key(&email_index(), IndexKey::composite(vec!["a".into(), "b".into()])),
            None
        );
    }

    #[test]
    fn diff_reports_only_changes() {
        let old: Contributions = [
            ("a".to_string(), keys(&[IndexKey::from(1i64)])),
            ("b".to_string(), keys(&[IndexKey::from("x")])),
        ]
        .into_iter()
        .collect();
        let new: Contributions = [
            ("a".to_string(), keys(&[IndexKey::from(2i64)])),
            ("b".to_string(), keys(&[IndexKey::from("x")])),
        ]
        .into_iter()
        .collect();

        let changes = diff(&old, &new);
        assert_eq!(
            changes,
            vec![IndexDiff {
                index: "a".into(),
                removes: vec![IndexKey::from(1i64)],
                adds: vec![IndexKey::from(2i64)],
            }]
        );
        assert!(diff(&new, &new).is_empty());
    }

    #[test]
    fn diff_against_nothing_removes_everything() {
        let old: Contributions = [("a".to_string(), keys(&[IndexKey::from(1i64)]))]
            .into_iter()
            .collect();
        let changes = diff(&old, &Contributions::new());
        assert_eq!(changes[0].removes, vec![IndexKey::from(1i64)]);
        assert!(changes[0].adds.is_empty());
    }
}
