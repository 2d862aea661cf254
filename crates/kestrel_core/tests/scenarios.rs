//! End-to-end transaction scenarios.

use kestrel_core::{
    CoreError, Database, IndexDefinition, PropertyType, Record, Rid, Session, Value,
};

fn people() -> Database {
    let db = Database::open_in_memory().unwrap();
    db.create_class("Person", None).unwrap();
    db.create_index(
        IndexDefinition::new("Person.email", "Person")
            .property("email", PropertyType::String)
            .unique(),
    )
    .unwrap();
    db
}

fn person(session: &mut Session, email: &str) -> Record {
    let mut record = session.new_record("Person").unwrap();
    record.set("email", email);
    session.save(&mut record).unwrap();
    record
}

#[test]
fn stale_read_conflicts_then_retry_succeeds() {
    let db = people();
    let mut setup = db.session();
    let mut record = person(&mut setup, "r@x");
    for n in 1..=3i64 {
        record.set("n", n);
        setup.save(&mut record).unwrap();
    }
    assert_eq!(record.version(), 3);

    let mut a = db.session();
    let mut b = db.session();
    a.begin().unwrap();
    b.begin().unwrap();
    let mut a_copy = a.load(record.rid()).unwrap().unwrap();
    let mut b_copy = b.load(record.rid()).unwrap().unwrap();
    assert_eq!(a_copy.version(), 3);
    assert_eq!(b_copy.version(), 3);

    b_copy.set("owner", "b");
    b.save(&mut b_copy).unwrap();
    let committed = b.commit().unwrap();
    assert_eq!(committed.version(record.rid()), Some(4));

    a_copy.set("owner", "a");
    a.save(&mut a_copy).unwrap();
    let err = a.commit().unwrap_err();
    assert!(err.is_retryable());
    assert!(matches!(
        err,
        CoreError::Conflict { rid, expected: 3, actual: Some(4) } if rid == record.rid()
    ));
    assert!(!a.is_in_transaction());

    a.begin().unwrap();
    let mut fresh = a.load(record.rid()).unwrap().unwrap();
    assert_eq!(fresh.version(), 4);
    assert_eq!(fresh.get("owner"), Some(&Value::from("b")));
    fresh.set("owner", "a");
    a.save(&mut fresh).unwrap();
    let result = a.commit().unwrap();
    assert_eq!(result.version(record.rid()), Some(5));

    let stats = db.stats();
    assert_eq!(stats.conflicts, 1);
}

#[test]
fn sequential_updates_bump_version_by_one_each() {
    let db = people();
    let mut session = db.session();
    let mut record = person(&mut session, "v@x");
    let start = record.version();
    for n in 0..7i64 {
        session
            .transaction(|s| {
                let mut copy = s.load(record.rid())?.ok_or(CoreError::RecordNotFound {
                    rid: record.rid(),
                })?;
                copy.set("n", n);
                s.save(&mut copy)
            })
            .unwrap();
    }
    record = session.load(record.rid()).unwrap().unwrap();
    assert_eq!(record.version(), start + 7);
}

#[test]
fn unique_put_fails_fast_within_a_transaction() {
    let db = people();
    let mut session = db.session();
    session.begin().unwrap();
    let x = person(&mut session, "1");

    let mut y = session.new_record("Person").unwrap();
    y.set("email", "1");
    let err = session.save(&mut y).unwrap_err();
    match err {
        CoreError::DuplicateKey {
            index,
            existing,
            rejected,
            ..
        } => {
            assert_eq!(index, "Person.email");
            assert_eq!(existing, x.rid());
            assert!(rejected.is_temporary());
            assert_ne!(rejected, x.rid());
        }
        other => panic!("unexpected error {other}"),
    }
    assert!(y.rid().is_unassigned());
    assert_eq!(session.index_get("Person.email", "1").unwrap(), vec![x.rid()]);

    let result = session.commit().unwrap();
    assert_eq!(result.remap.len(), 1);
    assert_eq!(db.count_class("Person", false).unwrap(), 1);
}

#[test]
fn created_records_are_private_until_commit() {
    let db = people();
    let mut writer = db.session();
    let reader = db.session();

    writer.begin().unwrap();
    let ada = person(&mut writer, "ada@x");
    assert_eq!(writer.index_get("Person.email", "ada@x").unwrap(), vec![ada.rid()]);
    assert!(reader.index_get("Person.email", "ada@x").unwrap().is_empty());
    assert_eq!(reader.index_size("Person.email").unwrap(), 0);

    writer.rollback().unwrap();
    assert!(writer.index_get("Person.email", "ada@x").unwrap().is_empty());
    assert!(reader.index_get("Person.email", "ada@x").unwrap().is_empty());
    assert_eq!(db.count_class("Person", false).unwrap(), 0);
}

#[test]
fn duplicate_at_commit_discards_every_add() {
    let db = people();
    let mut slow = db.session();
    let mut fast = db.session();

    slow.begin().unwrap();
    person(&mut slow, "a@x");
    person(&mut slow, "b@x");

    let winner = person(&mut fast, "b@x");

    let err = slow.commit().unwrap_err();
    assert!(matches!(err, CoreError::DuplicateKey { ref index, .. } if index == "Person.email"));
    assert!(!err.is_retryable());

    assert!(slow.index_get("Person.email", "a@x").unwrap().is_empty());
    assert_eq!(slow.index_get("Person.email", "b@x").unwrap(), vec![winner.rid()]);
    assert_eq!(db.count_class("Person", false).unwrap(), 1);
    assert_eq!(db.stats().duplicate_keys, 1);
}

#[test]
fn links_to_created_records_are_remapped() {
    let db = people();
    db.create_index(
        IndexDefinition::new("Person.friend", "Person").property("friend", PropertyType::Link),
    )
    .unwrap();

    let mut session = db.session();
    session.begin().unwrap();
    let ada = person(&mut session, "ada@x");
    let mut bob = session.new_record("Person").unwrap();
    bob.set("email", "bob@x");
    bob.set("friend", ada.link());
    session.save(&mut bob).unwrap();
    assert_eq!(session.index_get("Person.friend", ada.rid()).unwrap(), vec![bob.rid()]);

    let result = session.commit().unwrap();
    let ada_rid = result.resolve(ada.rid());
    let bob_rid = result.resolve(bob.rid());
    assert!(ada_rid.is_persistent() && bob_rid.is_persistent());

    let stored = session.load(bob_rid).unwrap().unwrap();
    let (collection, position) = ada_rid.as_link();
    assert_eq!(stored.get("friend"), Some(&Value::Link(collection, position)));
    assert_eq!(session.index_get("Person.friend", ada_rid).unwrap(), vec![bob_rid]);

    result.refresh(&mut bob);
    assert_eq!(bob.rid(), bob_rid);
    assert_eq!(bob.get("friend"), Some(&Value::Link(collection, position)));
}

#[test]
fn link_to_a_discarded_record_fails_the_commit() {
    let db = people();
    let mut session = db.session();
    session.begin().unwrap();
    let ada = person(&mut session, "ada@x");
    let mut bob = session.new_record("Person").unwrap();
    bob.set("friend", ada.link());
    session.save(&mut bob).unwrap();
    session.delete(&ada).unwrap();

    assert!(matches!(
        session.commit(),
        Err(CoreError::InvalidOperation { .. })
    ));
    assert_eq!(db.count_class("Person", false).unwrap(), 0);
}

#[test]
fn creation_order_decides_positions() {
    let db = people();
    let mut session = db.session();
    session.begin().unwrap();
    let first = person(&mut session, "1@x");
    let second = person(&mut session, "2@x");
    let third = person(&mut session, "3@x");
    let result = session.commit().unwrap();

    let positions: Vec<i64> = [first, second, third]
        .iter()
        .map(|r| result.resolve(r.rid()).position())
        .collect();
    assert_eq!(positions, vec![0, 1, 2]);
}

#[test]
fn deleted_record_conflicts_with_stale_update() {
    let db = people();
    let mut setup = db.session();
    let record = person(&mut setup, "gone@x");

    let mut editor = db.session();
    editor.begin().unwrap();
    let mut copy = editor.load(record.rid()).unwrap().unwrap();

    setup.delete(&record).unwrap();
    assert_eq!(setup.load(record.rid()).unwrap(), None);

    copy.set("email", "still@x");
    editor.save(&mut copy).unwrap();
    let err = editor.commit().unwrap_err();
    assert!(matches!(err, CoreError::Conflict { actual: None, .. }));
    assert!(setup.index_get("Person.email", "still@x").unwrap().is_empty());
}

#[test]
fn closure_error_rolls_back() {
    let db = people();
    let mut session = db.session();
    let result: Result<Rid, CoreError> = session.transaction(|s| {
        person(s, "ada@x");
        Err(CoreError::invalid_operation("changed my mind"))
    });
    assert!(result.is_err());
    assert!(!session.is_in_transaction());
    assert!(session.index_get("Person.email", "ada@x").unwrap().is_empty());
    assert_eq!(db.stats().transactions_rolled_back, 1);
}

#[test]
fn disjoint_commits_do_not_conflict() {
    let db = people();
    let mut setup = db.session();
    let one = person(&mut setup, "1@x");
    let two = person(&mut setup, "2@x");

    let mut a = db.session();
    let mut b = db.session();
    a.begin().unwrap();
    b.begin().unwrap();
    let mut one_copy = a.load(one.rid()).unwrap().unwrap();
    let mut two_copy = b.load(two.rid()).unwrap().unwrap();
    one_copy.set("email", "one@x");
    two_copy.set("email", "two@x");
    a.save(&mut one_copy).unwrap();
    b.save(&mut two_copy).unwrap();
    a.commit().unwrap();
    b.commit().unwrap();

    assert_eq!(setup.index_get("Person.email", "one@x").unwrap(), vec![one.rid()]);
    assert_eq!(setup.index_get("Person.email", "two@x").unwrap(), vec![two.rid()]);
    assert_eq!(setup.index_size("Person.email").unwrap(), 2);
}

#[test]
fn key_handover_between_records_commits() {
    let db = people();
    let mut session = db.session();
    let mut old = person(&mut session, "shared@x");
    let old_rid = old.rid();

    session.begin().unwrap();
    old.set("email", "retired@x");
    session.save(&mut old).unwrap();
    let new = person(&mut session, "shared@x");
    let result = session.commit().unwrap();

    let new_rid = result.resolve(new.rid());
    assert_eq!(session.index_get("Person.email", "shared@x").unwrap(), vec![new_rid]);
    assert_eq!(session.index_get("Person.email", "retired@x").unwrap(), vec![old_rid]);
}
