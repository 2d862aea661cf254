//! Document bodies: the property map persisted for each record.
//!
//! A body is one format-version byte followed by the CBOR encoding of the
//! property map. Properties are kept in a `BTreeMap`, so encoding the same
//! document twice yields identical bytes.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use std::collections::BTreeMap;

/// Current body format version.
pub const BODY_FORMAT_VERSION: u8 = 1;

/// An ordered map of property name to value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    properties: BTreeMap<String, Value>,
}

impl Document {
    /// Creates an empty document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a property value, if set.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// Sets a property, returning the previous value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.properties.insert(name.into(), value.into())
    }

    /// Removes a property, returning its value.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.properties.remove(name)
    }

    /// Returns true if the property is set (even to null).
    pub fn contains(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    /// Iterates properties in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.properties.iter()
    }

    /// Returns the number of properties.
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    /// Returns true if no property is set.
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Visits every link held by any property.
    pub fn visit_links_mut<F>(&mut self, f: &mut F)
    where
        F: FnMut(&mut i32, &mut i64),
    {
        for value in self.properties.values_mut() {
            value.visit_links_mut(f);
        }
    }

    /// Encodes this document into a record body.
    ///
    /// # Errors
    ///
    /// Returns an error if CBOR serialization fails.
    pub fn to_bytes(&self) -> CodecResult<Vec<u8>> {
        let mut body = vec![BODY_FORMAT_VERSION];
        ciborium::ser::into_writer(&self.properties, &mut body)
            .map_err(|e| CodecError::encoding_failed(e.to_string()))?;
        Ok(body)
    }

    /// Decodes a record body produced by [`Document::to_bytes`].
    ///
    /// # Errors
    ///
    /// Returns an error if the body is empty, has an unknown format version,
    /// or is not a valid CBOR property map.
    pub fn from_bytes(body: &[u8]) -> CodecResult<Self> {
        let (&version, payload) = body.split_first().ok_or(CodecError::UnexpectedEof)?;
        if version != BODY_FORMAT_VERSION {
            return Err(CodecError::UnsupportedVersion { version });
        }
        let properties: BTreeMap<String, Value> = ciborium::de::from_reader(payload)
            .map_err(|e| CodecError::decoding_failed(e.to_string()))?;
        Ok(Self { properties })
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Document {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            properties: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn scalar() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::Integer),
            "[a-zA-Z0-9 ]{0,12}".prop_map(Value::Text),
            (any::<i32>(), any::<i64>()).prop_map(|(c, p)| Value::Link(c, p)),
        ]
    }

    proptest! {
        #[test]
        fn arbitrary_documents_survive_encoding(
            props in prop::collection::btree_map("[a-z]{1,8}", scalar(), 0..8)
        ) {
            let doc: Document = props.into_iter().collect();
            let decoded = Document::from_bytes(&doc.to_bytes().unwrap()).unwrap();
            prop_assert_eq!(decoded, doc);
        }
    }

    fn person() -> Document {
        [
            ("name", Value::from("Alice")),
            ("age", Value::from(30i64)),
            ("friend", Value::Link(4, 2)),
            ("tags", Value::Array(vec!["a".into(), "b".into()])),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn body_roundtrip_preserves_every_kind() {
        let mut doc = person();
        doc.set("avatar", vec![0u8, 1, 2]);
        doc.set("nickname", Value::Null);
        doc.set("active", true);

        let decoded = Document::from_bytes(&doc.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, doc);
    }

    #[test]
    fn encoding_is_deterministic() {
        let a = person();
        let mut pairs: Vec<(String, Value)> =
            person().iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        pairs.reverse();
        let b: Document = pairs.into_iter().collect();
        assert_eq!(a.to_bytes().unwrap(), b.to_bytes().unwrap());
    }

    #[test]
    fn empty_body_is_rejected() {
        assert_eq!(Document::from_bytes(&[]), Err(CodecError::UnexpectedEof));
    }

    #[test]
    fn unknown_version_is_rejected() {
        let mut body = person().to_bytes().unwrap();
        body[0] = 9;
        assert_eq!(
            Document::from_bytes(&body),
            Err(CodecError::UnsupportedVersion { version: 9 })
        );
    }

    #[test]
    fn garbage_payload_is_rejected() {
        let result = Document::from_bytes(&[BODY_FORMAT_VERSION, 0xff, 0x00]);
        assert!(matches!(result, Err(CodecError::DecodingFailed { .. })));
    }

    #[test]
    fn set_returns_previous_value() {
        let mut doc = Document::new();
        assert_eq!(doc.set("x", 1i64), None);
        assert_eq!(doc.set("x", 2i64), Some(Value::Integer(1)));
        assert_eq!(doc.get("x"), Some(&Value::Integer(2)));
        assert_eq!(doc.remove("x"), Some(Value::Integer(2)));
        assert!(doc.is_empty());
    }
}
