//! Test fixtures and database helpers.
//!
//! Provides convenience functions for setting up test databases
//! and common test scenarios.

use kestrel_core::{
    Config, CoreError, CoreResult, Database, IndexDefinition, InMemoryRecordStore, PropertyType,
    Record, RecordStore, Session, Value,
};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Class used by the people fixtures.
pub const PERSON: &str = "Person";
/// Subclass of [`PERSON`] used by the people fixtures.
pub const EMPLOYEE: &str = "Employee";
/// Unique B-tree index on `Person.email`.
pub const EMAIL_INDEX: &str = "Person.email";
/// Non-unique hash index on `Person.age`.
pub const AGE_INDEX: &str = "Person.age";

/// A test database.
pub struct TestDatabase {
    /// The database instance.
    pub db: Database,
    /// The store under the database, for direct inspection.
    pub store: Arc<dyn RecordStore>,
}

impl TestDatabase {
    /// Creates a new in-memory test database.
    pub fn memory() -> Self {
        Self::with_config(Config::default())
    }

    /// Creates an in-memory test database with a custom configuration.
    pub fn with_config(config: Config) -> Self {
        Self::with_store(Arc::new(InMemoryRecordStore::new()), config)
    }

    /// Creates a test database over the given store.
    pub fn with_store(store: Arc<dyn RecordStore>, config: Config) -> Self {
        let db = Database::open_with_store(Arc::clone(&store), config)
            .expect("Failed to open test database");
        Self { db, store }
    }

    /// Creates a database with the people schema: `Person`, its subclass
    /// `Employee`, a unique email index and a hash index on age.
    pub fn people() -> Self {
        let test_db = Self::memory();
        install_people_schema(&test_db.db);
        test_db
    }
}

impl std::ops::Deref for TestDatabase {
    type Target = Database;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

/// Creates the people schema on an empty database.
pub fn install_people_schema(db: &Database) {
    db.create_class(PERSON, None).expect("Failed to create Person");
    db.create_class(EMPLOYEE, Some(PERSON))
        .expect("Failed to create Employee");
    db.create_index(
        IndexDefinition::new(EMAIL_INDEX, PERSON)
            .property("email", PropertyType::String)
            .unique(),
    )
    .expect("Failed to create email index");
    db.create_index(
        IndexDefinition::new(AGE_INDEX, PERSON)
            .property("age", PropertyType::Integer)
            .hash(),
    )
    .expect("Failed to create age index");
}

/// Runs a test with a temporary in-memory database.
///
/// # Example
///
/// ```rust
/// use kestrel_testkit::with_temp_db;
///
/// with_temp_db(|db| {
///     db.create_class("Note", None).unwrap();
///     assert!(db.class("Note").is_some());
/// });
/// ```
pub fn with_temp_db<F, R>(f: F) -> R
where
    F: FnOnce(&Database) -> R,
{
    let test_db = TestDatabase::memory();
    f(&test_db.db)
}

/// Runs a test with a database holding the people schema.
pub fn with_people_db<F, R>(f: F) -> R
where
    F: FnOnce(&Database) -> R,
{
    let test_db = TestDatabase::people();
    f(&test_db.db)
}

/// Saves a `Person` with an email and age. Commits immediately outside a
/// transaction.
pub fn insert_person(session: &mut Session, email: &str, age: i64) -> Record {
    let mut record = session.new_record(PERSON).expect("Failed to create record");
    record.set("email", email);
    record.set("age", age);
    session.save(&mut record).expect("Failed to save person");
    record
}

/// Converts a JSON value to a record property value.
///
/// # Errors
///
/// Returns `InvalidOperation` for numbers that are not 64-bit integers.
pub fn json_to_value(json: &serde_json::Value) -> CoreResult<Value> {
    Ok(match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => Value::Integer(n.as_i64().ok_or_else(|| {
            CoreError::invalid_operation(format!("{n} is not an integer"))
        })?),
        serde_json::Value::String(s) => Value::Text(s.clone()),
        serde_json::Value::Array(items) => {
            Value::Array(items.iter().map(json_to_value).collect::<CoreResult<_>>()?)
        }
        serde_json::Value::Object(fields) => Value::Map(
            fields
                .iter()
                .map(|(name, value)| Ok((name.clone(), json_to_value(value)?)))
                .collect::<CoreResult<BTreeMap<_, _>>>()?,
        ),
    })
}

/// Saves one record of `class` per object of a JSON array, in order.
///
/// Inside a transaction the records are staged; outside, each is committed
/// on its own.
///
/// # Errors
///
/// Returns `InvalidOperation` if the text is not a JSON array of objects,
/// or the first error raised while saving.
pub fn seed_from_json(session: &mut Session, class: &str, json: &str) -> CoreResult<Vec<Record>> {
    let rows: Vec<serde_json::Map<String, serde_json::Value>> = serde_json::from_str(json)
        .map_err(|err| CoreError::invalid_operation(format!("bad fixture: {err}")))?;
    let mut saved = Vec::with_capacity(rows.len());
    for row in rows {
        let mut record = session.new_record(class)?;
        for (name, value) in &row {
            record.set(name.clone(), json_to_value(value)?);
        }
        session.save(&mut record)?;
        saved.push(record);
    }
    Ok(saved)
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Creates a people database with `count` committed persons,
    /// `person{i}@example.org` aged `20 + i % 50`.
    pub fn populated_people(count: usize) -> (TestDatabase, Vec<Record>) {
        let test_db = TestDatabase::people();
        let mut session = test_db.db.session();
        let records = (0..count)
            .map(|i| insert_person(&mut session, &format!("person{i}@example.org"), 20 + (i % 50) as i64))
            .collect();
        drop(session);
        (test_db, records)
    }

    /// Creates a database whose `Counter` class holds `count` counters at
    /// zero, for contention runs.
    pub fn counters(count: usize) -> (TestDatabase, Vec<Record>) {
        let test_db = TestDatabase::memory();
        test_db
            .db
            .create_class("Counter", None)
            .expect("Failed to create Counter");
        let mut session = test_db.db.session();
        let records = (0..count)
            .map(|i| {
                let mut counter = session.new_record("Counter").expect("Failed to create counter");
                counter.set("name", format!("counter{i}"));
                counter.set("value", 0i64);
                session.save(&mut counter).expect("Failed to save counter");
                counter
            })
            .collect();
        drop(session);
        (test_db, records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_people_schema() {
        let test_db = TestDatabase::people();
        assert_eq!(test_db.index_names(), vec![AGE_INDEX.to_string(), EMAIL_INDEX.to_string()]);
        assert_eq!(test_db.class(EMPLOYEE).unwrap().superclass.as_deref(), Some(PERSON));
    }

    #[test]
    fn test_populated_scenario() {
        let (test_db, records) = scenarios::populated_people(10);
        assert_eq!(records.len(), 10);
        assert_eq!(test_db.count_class(PERSON, false).unwrap(), 10);
        let session = test_db.session();
        assert_eq!(
            session.index_get(EMAIL_INDEX, "person3@example.org").unwrap(),
            vec![records[3].rid()]
        );
    }

    #[test]
    fn test_json_values() {
        let json: serde_json::Value =
            serde_json::from_str(r#"{"tags":["a",1,null],"nested":{"ok":true}}"#).unwrap();
        let value = json_to_value(&json).unwrap();
        assert_eq!(
            value.get("tags"),
            Some(&Value::Array(vec!["a".into(), 1i64.into(), Value::Null]))
        );
        assert_eq!(value.get("nested").and_then(|n| n.get("ok")), Some(&Value::Bool(true)));

        let float: serde_json::Value = serde_json::from_str("1.5").unwrap();
        assert!(json_to_value(&float).is_err());
    }

    #[test]
    fn test_seed_from_json() {
        with_people_db(|db| {
            let mut session = db.session();
            let saved = seed_from_json(
                &mut session,
                PERSON,
                r#"[{"email":"a@x","age":30},{"email":"b@x","age":30}]"#,
            )
            .unwrap();
            assert_eq!(saved.len(), 2);
            assert_eq!(session.index_get(AGE_INDEX, 30i64).unwrap().len(), 2);

            let err = seed_from_json(&mut session, PERSON, r#"{"email":"c@x"}"#).unwrap_err();
            assert!(matches!(err, CoreError::InvalidOperation { .. }));
        });
    }
}
