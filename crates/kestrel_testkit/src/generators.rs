//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random values, documents and
//! transaction workloads.

use kestrel_codec::{Document, Value};
use kestrel_core::IndexKey;
use proptest::prelude::*;

/// Strategy for generating scalar property values.
pub fn scalar_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Integer),
        "[a-z]{0,12}".prop_map(Value::Text),
        prop::collection::vec(any::<u8>(), 0..16).prop_map(Value::Bytes),
        (0..8i32, 0..64i64).prop_map(|(c, p)| Value::Link(c, p)),
    ]
}

/// Strategy for generating property values, nested up to three levels.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    scalar_value_strategy().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..4).prop_map(Value::Map),
        ]
    })
}

/// Strategy for generating valid property names.
pub fn property_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-zA-Z0-9_]{0,15}").expect("Invalid regex")
}

/// Strategy for generating documents of up to eight properties.
pub fn document_strategy() -> impl Strategy<Value = Document> {
    prop::collection::btree_map(property_name_strategy(), value_strategy(), 0..8).prop_map(|fields| {
        let mut document = Document::new();
        for (name, value) in fields {
            document.set(name, value);
        }
        document
    })
}

/// Strategy for generating email-like text keys drawn from a small pool,
/// so that unique-key collisions are common.
pub fn email_strategy(pool: usize) -> impl Strategy<Value = String> {
    (0..pool.max(1)).prop_map(|n| format!("user{n}@example.org"))
}

/// Strategy for generating single-component integer or text index keys.
pub fn index_key_strategy() -> impl Strategy<Value = IndexKey> {
    prop_oneof![
        any::<i64>().prop_map(IndexKey::from),
        "[a-z]{0,8}".prop_map(IndexKey::from),
    ]
}

/// One step of a generated single-transaction workload over records
/// referred to by their position in creation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkloadOp {
    /// Create a record with an email.
    Create(String),
    /// Change the email of the n-th record, wrapping around.
    Update(usize, String),
    /// Delete the n-th record, wrapping around.
    Delete(usize),
}

/// Strategy for generating workloads over a pool of `pool` emails.
pub fn workload_strategy(pool: usize, len: std::ops::Range<usize>) -> impl Strategy<Value = Vec<WorkloadOp>> {
    let op = prop_oneof![
        3 => email_strategy(pool).prop_map(WorkloadOp::Create),
        2 => (any::<usize>(), email_strategy(pool)).prop_map(|(n, email)| WorkloadOp::Update(n, email)),
        1 => any::<usize>().prop_map(WorkloadOp::Delete),
    ];
    prop::collection::vec(op, len)
}

/// Configuration for property tests.
pub struct PropTestConfig;

impl PropTestConfig {
    /// Default number of test cases.
    pub const DEFAULT_CASES: u32 = 256;

    /// Number of test cases for workloads that run a full commit per case.
    pub const COMMIT_CASES: u32 = 64;

    /// Creates a proptest config with the given number of cases.
    pub fn with_cases(cases: u32) -> ProptestConfig {
        ProptestConfig::with_cases(cases)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn depth(value: &Value) -> usize {
        match value {
            Value::Array(items) => 1 + items.iter().map(depth).max().unwrap_or(0),
            Value::Map(fields) => 1 + fields.values().map(depth).max().unwrap_or(0),
            _ => 0,
        }
    }

    proptest! {
        #[test]
        fn test_values_stay_shallow(value in value_strategy()) {
            prop_assert!(depth(&value) <= 3);
        }

        #[test]
        fn test_documents_survive_encoding(document in document_strategy()) {
            let bytes = document.to_bytes().unwrap();
            prop_assert_eq!(Document::from_bytes(&bytes).unwrap(), document);
        }

        #[test]
        fn test_emails_come_from_the_pool(email in email_strategy(3)) {
            prop_assert!(["user0@example.org", "user1@example.org", "user2@example.org"]
                .contains(&email.as_str()));
        }

        #[test]
        fn test_workload_length(ops in workload_strategy(4, 1..10)) {
            prop_assert!(!ops.is_empty() && ops.len() < 10);
        }
    }
}
