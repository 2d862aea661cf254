//! Storage faults must never leave committed state half applied.

use kestrel_core::{Config, CoreError, InMemoryRecordStore};
use kestrel_storage::StorageError;
use kestrel_testkit::{
    insert_person, install_people_schema, FaultyRecordStore, TestDatabase, EMAIL_INDEX, PERSON,
};
use std::sync::Arc;

fn faulty_people(config: Config) -> (TestDatabase, Arc<FaultyRecordStore>) {
    let store = Arc::new(FaultyRecordStore::new(Arc::new(InMemoryRecordStore::new())));
    let test_db = TestDatabase::with_store(store.clone(), config);
    install_people_schema(&test_db);
    (test_db, store)
}

#[test]
fn failed_batch_leaves_indexes_untouched() {
    let (test_db, store) = faulty_people(Config::default());
    let mut session = test_db.session();
    let ada = insert_person(&mut session, "ada@x", 36);

    session.begin().unwrap();
    let mut copy = session.load(ada.rid()).unwrap().unwrap();
    copy.set("email", "lovelace@x");
    session.save(&mut copy).unwrap();
    insert_person(&mut session, "bob@x", 40);

    store.fail_batches(1);
    let err = session.commit().unwrap_err();
    assert!(matches!(err, CoreError::Storage(StorageError::Io(_))));
    assert!(!session.is_in_transaction());

    assert_eq!(session.index_get(EMAIL_INDEX, "ada@x").unwrap(), vec![ada.rid()]);
    assert!(session.index_get(EMAIL_INDEX, "lovelace@x").unwrap().is_empty());
    assert!(session.index_get(EMAIL_INDEX, "bob@x").unwrap().is_empty());
    assert_eq!(test_db.count_class(PERSON, false).unwrap(), 1);

    let stored = session.load(ada.rid()).unwrap().unwrap();
    assert_eq!(stored.version(), ada.version());
}

#[test]
fn failed_allocation_fails_the_commit_cleanly() {
    let (test_db, store) = faulty_people(Config::default());
    let mut session = test_db.session();
    session.begin().unwrap();
    insert_person(&mut session, "ada@x", 36);
    insert_person(&mut session, "bob@x", 40);

    store.fail_allocations(1);
    assert!(session.commit().is_err());
    assert_eq!(test_db.count_class(PERSON, false).unwrap(), 0);
    assert_eq!(session.index_size(EMAIL_INDEX).unwrap(), 0);

    store.heal();
    insert_person(&mut session, "ada@x", 36);
    assert_eq!(session.index_size(EMAIL_INDEX).unwrap(), 1);
}

#[test]
fn partial_truncate_drops_entries_of_truncated_collections_only() {
    let (test_db, store) = faulty_people(Config::default().collections_per_class(2));
    let collections = test_db.class(PERSON).unwrap().collections;
    let mut session = test_db.session();
    for n in 0..4 {
        insert_person(&mut session, &format!("p{n}@x"), 30);
    }

    store.fail_truncate_of(collections[1]);
    assert!(session.truncate_class(PERSON, false).is_err());

    let remaining = test_db.count_class(PERSON, false).unwrap();
    assert_eq!(remaining, 2);
    assert_eq!(session.index_size(EMAIL_INDEX).unwrap(), 2);
    for (_, rid) in session
        .index_range(EMAIL_INDEX, std::ops::Bound::Unbounded, std::ops::Bound::Unbounded, true)
        .unwrap()
    {
        assert_eq!(rid.collection_id(), collections[1]);
    }

    store.heal();
    assert_eq!(session.truncate_class(PERSON, false).unwrap(), 2);
    assert_eq!(session.index_size(EMAIL_INDEX).unwrap(), 0);
}

#[test]
fn closed_store_surfaces_storage_errors() {
    let (test_db, store) = faulty_people(Config::default());
    let mut session = test_db.session();
    store.close();
    let mut record = session.new_record(PERSON).unwrap();
    record.set("email", "ada@x");
    assert!(matches!(
        session.save(&mut record),
        Err(CoreError::Storage(StorageError::Closed))
    ));
}
