//! Database handle and shared committed state.

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::index::{build_engine, derive_keys, CommittedIndexStore};
use crate::mvcc::StripedLocks;
use crate::schema::{ClassDefinition, IndexDefinition, Schema};
use crate::session::Session;
use crate::stats::{DatabaseStats, StatsSnapshot};
use crate::types::{SessionId, TransactionId};
use kestrel_codec::Document;
use kestrel_storage::{InMemoryRecordStore, RecordStore};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicI32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::info;

/// State shared by every session of a database.
///
/// Lock order: commit stripes, then `schema`, then `indexes`. The schema
/// lock is never taken while the index lock is held.
pub(crate) struct Shared {
    pub(crate) config: Config,
    pub(crate) storage: Arc<dyn RecordStore>,
    pub(crate) schema: RwLock<Schema>,
    pub(crate) indexes: RwLock<CommittedIndexStore>,
    pub(crate) locks: StripedLocks,
    pub(crate) stats: DatabaseStats,
    next_transaction: AtomicU64,
    next_session: AtomicU64,
    next_collection: AtomicI32,
    placement: AtomicUsize,
}

impl Shared {
    pub(crate) fn next_transaction_id(&self) -> TransactionId {
        TransactionId::new(self.next_transaction.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn next_session_id(&self) -> SessionId {
        SessionId::new(self.next_session.fetch_add(1, Ordering::Relaxed))
    }

    /// Picks the collection a new record of the class is stored in,
    /// round-robin over the class's collections.
    pub(crate) fn place(&self, class: &ClassDefinition) -> i32 {
        let turn = self.placement.fetch_add(1, Ordering::Relaxed);
        class.collections[turn % class.collections.len()]
    }
}

/// The main database handle.
///
/// `Database` owns the committed state shared by all sessions: the record
/// store, the schema, the committed index entries and the commit lock
/// table. Handles are cheap to clone; every clone refers to the same
/// database.
///
/// # Example
///
/// ```rust
/// use kestrel_core::{Database, IndexDefinition, PropertyType};
///
/// let db = Database::open_in_memory().unwrap();
/// db.create_class("Person", None).unwrap();
/// db.create_index(
///     IndexDefinition::new("Person.email", "Person")
///         .property("email", PropertyType::String)
///         .unique(),
/// )
/// .unwrap();
///
/// let mut session = db.session();
/// let rid = session
///     .transaction(|s| {
///         let mut ada = s.new_record("Person")?;
///         ada.set("email", "ada@example.org");
///         s.save(&mut ada)?;
///         Ok(ada.rid())
///     })
///     .unwrap();
/// assert!(rid.is_temporary());
/// assert_eq!(session.index_size("Person.email").unwrap(), 1);
/// ```
#[derive(Clone)]
pub struct Database {
    shared: Arc<Shared>,
}

impl Database {
    /// Opens an empty database backed by an in-memory record store.
    ///
    /// # Errors
    ///
    /// Currently infallible; the signature matches [`Database::open_with_store`].
    pub fn open_in_memory() -> CoreResult<Self> {
        Self::open_with_store(Arc::new(InMemoryRecordStore::new()), Config::default())
    }

    /// Opens a database over an existing record store.
    ///
    /// The schema is not persisted: classes and indexes must be created
    /// after opening. Collection ids are handed out to classes from 0.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` if the configuration is unusable.
    pub fn open_with_store(storage: Arc<dyn RecordStore>, config: Config) -> CoreResult<Self> {
        if config.collections_per_class == 0 {
            return Err(CoreError::invalid_operation(
                "collections_per_class must be at least 1",
            ));
        }
        info!(
            lock_stripes = config.lock_stripes,
            collections_per_class = config.collections_per_class,
            "database opened"
        );
        Ok(Self {
            shared: Arc::new(Shared {
                locks: StripedLocks::new(config.lock_stripes),
                config,
                storage,
                schema: RwLock::new(Schema::new()),
                indexes: RwLock::new(CommittedIndexStore::new()),
                stats: DatabaseStats::new(),
                next_transaction: AtomicU64::new(1),
                next_session: AtomicU64::new(1),
                next_collection: AtomicI32::new(0),
                placement: AtomicUsize::new(0),
            }),
        })
    }

    /// Returns the database configuration.
    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    /// Returns a snapshot of the database statistics.
    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Opens a session bound to the current thread.
    pub fn session(&self) -> Session {
        Session::new(Arc::clone(&self.shared))
    }

    /// Creates a class with `Config::collections_per_class` fresh
    /// collections.
    ///
    /// # Errors
    ///
    /// Fails if the class exists or the superclass is unknown.
    pub fn create_class(&self, name: &str, superclass: Option<&str>) -> CoreResult<ClassDefinition> {
        let mut schema = self.shared.schema.write();
        if schema.class(name).is_some() {
            return Err(CoreError::invalid_operation(format!(
                "class '{name}' already exists"
            )));
        }
        let count = self.shared.config.collections_per_class;
        let first = self
            .shared
            .next_collection
            .fetch_add(count as i32, Ordering::Relaxed);
        let collections = (0..count as i32).map(|offset| first + offset).collect();
        let class = schema.create_class(name, superclass, collections)?.clone();
        info!(class = name, collections = ?class.collections, "class created");
        Ok(class)
    }

    /// Returns a class definition.
    pub fn class(&self, name: &str) -> Option<ClassDefinition> {
        self.shared.schema.read().class(name).cloned()
    }

    /// Creates an index and fills it from the records already stored for the
    /// class and its subclasses.
    ///
    /// Runs with every commit stripe held. Transactions open at this moment
    /// do not maintain the new index for records they saved earlier.
    ///
    /// # Errors
    ///
    /// Fails if the definition is invalid, the name is taken, a stored
    /// value cannot be used as a key, or existing records violate a unique
    /// index.
    pub fn create_index(&self, definition: IndexDefinition) -> CoreResult<()> {
        let _guards = self.shared.locks.lock_all();
        let mut schema = self.shared.schema.write();
        schema.validate_index(&definition)?;

        let collections: Vec<i32> = schema
            .class_and_subclasses(&definition.class)
            .into_iter()
            .filter_map(|class| schema.class(class))
            .flat_map(|class| class.collections.iter().copied())
            .collect();

        let mut engine = build_engine(definition.clone());
        for collection in collections {
            for (rid, stored) in self.shared.storage.scan_collection(collection)? {
                let document = Document::from_bytes(&stored.body)?;
                for key in derive_keys(&definition, &document)? {
                    engine.insert(key, rid)?;
                }
            }
        }
        let entries = engine.len();

        self.shared.indexes.write().insert(engine)?;
        let name = definition.name.clone();
        schema.add_index(definition)?;
        info!(index = %name, entries, "index created");
        Ok(())
    }

    /// Removes an index and its committed entries.
    ///
    /// # Errors
    ///
    /// Fails if the index does not exist.
    pub fn drop_index(&self, name: &str) -> CoreResult<()> {
        let _guards = self.shared.locks.lock_all();
        let mut schema = self.shared.schema.write();
        schema.drop_index(name)?;
        self.shared.indexes.write().drop_index(name)?;
        info!(index = name, "index dropped");
        Ok(())
    }

    /// Returns an index definition.
    pub fn index(&self, name: &str) -> Option<IndexDefinition> {
        self.shared.schema.read().index(name).cloned()
    }

    /// Returns the names of every index, sorted.
    pub fn index_names(&self) -> Vec<String> {
        self.shared
            .indexes
            .read()
            .names()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// Returns the number of stored records of a class, optionally
    /// including its subclasses.
    ///
    /// # Errors
    ///
    /// Fails if the class does not exist or the store is unavailable.
    pub fn count_class(&self, name: &str, polymorphic: bool) -> CoreResult<u64> {
        let collections = self.shared.collections_of(name, polymorphic)?;
        collections.into_iter().try_fold(0, |total, collection| {
            Ok(total + self.shared.storage.record_count(collection)?)
        })
    }
}

impl Shared {
    /// Collections owned by a class, and by its subclasses if requested.
    pub(crate) fn collections_of(&self, class: &str, polymorphic: bool) -> CoreResult<Vec<i32>> {
        let schema = self.schema.read();
        schema.require_class(class)?;
        let classes = if polymorphic {
            schema.class_and_subclasses(class)
        } else {
            vec![class]
        };
        Ok(classes
            .into_iter()
            .filter_map(|name| schema.class(name))
            .flat_map(|class| class.collections.iter().copied())
            .collect())
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("config", &self.shared.config)
            .field("stats", &self.shared.stats.snapshot())
            .finish_non_exhaustive()
    }
}
