//! Benchmark utilities.

use kestrel_codec::{Document, Value};
use kestrel_core::{Database, IndexDefinition, PropertyType, Record, Session};
use rand::seq::SliceRandom;
use rand::Rng;

/// Class used by every benchmark.
pub const CLASS: &str = "Person";
/// Unique index on `Person.email`.
pub const EMAIL_INDEX: &str = "Person.email";
/// Non-unique index on `Person.age`.
pub const AGE_INDEX: &str = "Person.age";

/// Opens an in-memory database with a unique email index and a
/// non-unique age index.
pub fn people_database() -> Database {
    let db = Database::open_in_memory().unwrap();
    db.create_class(CLASS, None).unwrap();
    db.create_index(
        IndexDefinition::new(EMAIL_INDEX, CLASS)
            .property("email", PropertyType::String)
            .unique(),
    )
    .unwrap();
    db.create_index(IndexDefinition::new(AGE_INDEX, CLASS).property("age", PropertyType::Integer))
        .unwrap();
    db
}

/// Generates `count` distinct emails in random order.
pub fn shuffled_emails(count: usize) -> Vec<String> {
    let mut emails: Vec<String> = (0..count).map(|i| format!("user{i}@example.org")).collect();
    emails.shuffle(&mut rand::thread_rng());
    emails
}

/// Builds an unsaved person with a random age.
pub fn person(session: &Session, email: &str) -> Record {
    let mut record = session.new_record(CLASS).unwrap();
    record.set("email", email);
    record.set("age", rand::thread_rng().gen_range(18..90i64));
    record
}

/// Commits `count` persons and returns them.
pub fn populate(db: &Database, count: usize) -> Vec<Record> {
    let mut session = db.session();
    shuffled_emails(count)
        .iter()
        .map(|email| {
            let mut record = person(&session, email);
            session.save(&mut record).unwrap();
            record
        })
        .collect()
}

/// Builds a document with `fields` random text properties of `size` bytes.
pub fn random_document(fields: usize, size: usize) -> Document {
    let mut rng = rand::thread_rng();
    let mut document = Document::new();
    for i in 0..fields {
        let text: String = (0..size).map(|_| rng.gen_range(b'a'..=b'z') as char).collect();
        document.set(format!("field_{i}"), Value::Text(text));
    }
    document
}
