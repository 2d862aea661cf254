//! Sessions: the per-thread entry point for reads, writes and transactions.

use crate::database::Shared;
use crate::error::{CoreError, CoreResult};
use crate::index::{contributions, diff, normalize_key, Contributions, Index, IndexKey, IndexOverlay};
use crate::listener::{ListenerEvent, ListenerId, ListenerRegistry, SessionListener};
use crate::record::Record;
use crate::schema::IndexDefinition;
use crate::transaction::{self, CommitResult, Lookup, PendingWrite, TransactionContext};
use crate::types::{SessionId, TransactionId};
use kestrel_codec::Document;
use kestrel_storage::{Rid, StoredRecord};
use std::collections::BTreeSet;
use std::ops::Bound;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Instant;
use tracing::{debug, info, trace, warn};

/// A connection to a database, used by one thread at a time.
///
/// A session runs at most one transaction. Inside a transaction, loads and
/// index reads see the transaction's own staged changes on top of committed
/// state; other sessions see nothing until commit. Outside a transaction,
/// reads see committed state and each `save` or `delete` commits on its own.
///
/// A session is bound to the thread that opened it. To hand it to another
/// thread, move it there and call [`Session::activate_on_current_thread`].
///
/// # Example
///
/// ```rust
/// use kestrel_core::{CoreError, Database};
///
/// let db = Database::open_in_memory().unwrap();
/// db.create_class("Account", None).unwrap();
///
/// let mut alice = db.session();
/// let mut account = alice.new_record("Account").unwrap();
/// account.set("balance", 100i64);
/// alice.save(&mut account).unwrap();
///
/// let mut bob = db.session();
/// alice.begin().unwrap();
/// bob.begin().unwrap();
/// let mut a = alice.load(account.rid()).unwrap().unwrap();
/// let mut b = bob.load(account.rid()).unwrap().unwrap();
/// a.set("balance", 50i64);
/// b.set("balance", 70i64);
/// alice.save(&mut a).unwrap();
/// bob.save(&mut b).unwrap();
///
/// alice.commit().unwrap();
/// assert!(matches!(bob.commit(), Err(CoreError::Conflict { .. })));
/// ```
pub struct Session {
    id: SessionId,
    shared: Arc<Shared>,
    owner: ThreadId,
    tx: Option<TransactionContext>,
    listeners: ListenerRegistry,
    closed: bool,
}

impl Session {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        let id = shared.next_session_id();
        debug!(session = %id, "session opened");
        Self {
            id,
            shared,
            owner: thread::current().id(),
            tx: None,
            listeners: ListenerRegistry::default(),
            closed: false,
        }
    }

    /// Returns the session id.
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Returns true once the session is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Returns true while a transaction is open.
    #[must_use]
    pub fn is_in_transaction(&self) -> bool {
        self.tx.is_some()
    }

    /// Returns the id of the open transaction.
    #[must_use]
    pub fn transaction_id(&self) -> Option<TransactionId> {
        self.tx.as_ref().map(TransactionContext::id)
    }

    /// Returns the state of the open transaction.
    #[must_use]
    pub fn context(&self) -> Option<&TransactionContext> {
        self.tx.as_ref()
    }

    /// Binds the session to the calling thread.
    ///
    /// # Errors
    ///
    /// Returns `SessionClosed` if the session was closed.
    pub fn activate_on_current_thread(&mut self) -> CoreResult<()> {
        if self.closed {
            return Err(CoreError::SessionClosed);
        }
        self.owner = thread::current().id();
        Ok(())
    }

    fn ensure_active(&self) -> CoreResult<()> {
        if self.closed {
            Err(CoreError::SessionClosed)
        } else if thread::current().id() != self.owner {
            Err(CoreError::SessionNotActive)
        } else {
            Ok(())
        }
    }

    fn active_context(&mut self) -> CoreResult<&mut TransactionContext> {
        self.tx
            .as_mut()
            .ok_or_else(|| CoreError::transaction_state("no active transaction"))
    }

    // =========================================================================
    // Listeners
    // =========================================================================

    /// Registers a lifecycle listener. Listeners fire in registration order.
    ///
    /// # Errors
    ///
    /// Returns `TransactionState` while a transaction is open.
    pub fn register_listener(&mut self, listener: Arc<dyn SessionListener>) -> CoreResult<ListenerId> {
        self.ensure_active()?;
        if self.tx.is_some() {
            return Err(CoreError::transaction_state(
                "cannot register a listener while a transaction is active",
            ));
        }
        Ok(self.listeners.register(listener))
    }

    /// Unregisters a listener. Returns false if it was not registered.
    ///
    /// # Errors
    ///
    /// Returns `TransactionState` while a transaction is open.
    pub fn unregister_listener(&mut self, id: ListenerId) -> CoreResult<bool> {
        self.ensure_active()?;
        if self.tx.is_some() {
            return Err(CoreError::transaction_state(
                "cannot unregister a listener while a transaction is active",
            ));
        }
        Ok(self.listeners.unregister(id))
    }

    // =========================================================================
    // Transaction lifecycle
    // =========================================================================

    /// Begins a transaction.
    ///
    /// # Errors
    ///
    /// Returns `TransactionState` if a transaction is already open, or
    /// `ListenerAbort` if a before-begin listener refused.
    pub fn begin(&mut self) -> CoreResult<TransactionId> {
        self.ensure_active()?;
        if self.tx.is_some() {
            return Err(CoreError::transaction_state(
                "a transaction is already active on this session",
            ));
        }
        if let Err(source) = self.listeners.before_begin(self.id) {
            self.shared.stats.record_listener_abort();
            warn!(session = %self.id, error = %source, "begin refused by listener");
            return Err(CoreError::ListenerAbort {
                event: ListenerEvent::BeforeBegin,
                source,
            });
        }
        let id = self.shared.next_transaction_id();
        self.tx = Some(TransactionContext::new(id, self.shared.config.record_cache_limit));
        self.shared.stats.record_transaction_start();
        debug!(session = %self.id, tx = %id, "transaction started");
        Ok(id)
    }

    /// Commits the open transaction.
    ///
    /// On any failure the transaction is rolled back, rollback listeners
    /// included, before the error is returned. Committed state is then
    /// unchanged.
    ///
    /// # Errors
    ///
    /// - `TransactionState` if no transaction is open
    /// - `ListenerAbort` if a before-commit listener refused
    /// - `Conflict` if a record changed since this transaction read it
    /// - `DuplicateKey` if a unique key was taken by a concurrent commit
    pub fn commit(&mut self) -> CoreResult<CommitResult> {
        self.ensure_active()?;
        let ctx = self
            .tx
            .take()
            .ok_or_else(|| CoreError::transaction_state("no active transaction to commit"))?;
        let summary = ctx.summary();

        if let Err(source) = self.listeners.before_commit(&summary) {
            self.shared.stats.record_listener_abort();
            warn!(tx = %summary.id, error = %source, "commit refused by listener");
            self.rollback_after_failure(ctx);
            return Err(CoreError::ListenerAbort {
                event: ListenerEvent::BeforeCommit,
                source,
            });
        }

        let started = Instant::now();
        match transaction::commit(&self.shared, &ctx) {
            Ok(result) => {
                let elapsed = started.elapsed();
                self.shared.stats.record_commit(
                    summary.created.len(),
                    summary.updated.len(),
                    summary.deleted.len(),
                );
                debug!(
                    tx = %summary.id,
                    created = summary.created.len(),
                    updated = summary.updated.len(),
                    deleted = summary.deleted.len(),
                    elapsed_us = elapsed.as_micros() as u64,
                    "transaction committed"
                );
                if elapsed > self.shared.config.slow_commit_threshold {
                    warn!(tx = %summary.id, elapsed_ms = elapsed.as_millis() as u64, "slow commit");
                }
                drop(ctx);
                self.listeners.after_commit(&result);
                Ok(result)
            }
            Err(err) => {
                match &err {
                    CoreError::Conflict {
                        rid,
                        expected,
                        actual,
                    } => {
                        self.shared.stats.record_conflict();
                        warn!(tx = %summary.id, %rid, expected, ?actual, "commit conflict");
                    }
                    CoreError::DuplicateKey { index, key, .. } => {
                        self.shared.stats.record_duplicate_key();
                        warn!(tx = %summary.id, index = %index, %key, "duplicate key at commit");
                    }
                    other => warn!(tx = %summary.id, error = %other, "commit failed"),
                }
                self.rollback_after_failure(ctx);
                Err(err)
            }
        }
    }

    /// Rolls back the open transaction, discarding its staged changes.
    ///
    /// # Errors
    ///
    /// Returns `TransactionState` if no transaction is open. Returns
    /// `ListenerAbort` if a before-rollback listener failed; the rollback
    /// has completed regardless.
    pub fn rollback(&mut self) -> CoreResult<()> {
        self.ensure_active()?;
        let ctx = self
            .tx
            .take()
            .ok_or_else(|| CoreError::transaction_state("no active transaction to roll back"))?;
        self.finish_rollback(ctx)
    }

    fn finish_rollback(&self, ctx: TransactionContext) -> CoreResult<()> {
        let summary = ctx.summary();
        let refused = self.listeners.before_rollback(&summary).err();
        drop(ctx);
        self.shared.stats.record_rollback();
        debug!(tx = %summary.id, "transaction rolled back");
        self.listeners.after_rollback(summary.id);
        match refused {
            Some(source) => {
                self.shared.stats.record_listener_abort();
                Err(CoreError::ListenerAbort {
                    event: ListenerEvent::BeforeRollback,
                    source,
                })
            }
            None => Ok(()),
        }
    }

    fn rollback_after_failure(&self, ctx: TransactionContext) {
        if let Err(err) = self.finish_rollback(ctx) {
            warn!(session = %self.id, error = %err, "rollback listener failed");
        }
    }

    /// Executes a closure within a transaction.
    ///
    /// Commits if the closure returns `Ok`; rolls back if it returns `Err`.
    ///
    /// # Errors
    ///
    /// Returns the closure's error, or the commit error.
    pub fn transaction<F, T>(&mut self, work: F) -> CoreResult<T>
    where
        F: FnOnce(&mut Session) -> CoreResult<T>,
    {
        self.run_in_transaction(work).map(|(value, _)| value)
    }

    fn run_in_transaction<F, T>(&mut self, work: F) -> CoreResult<(T, CommitResult)>
    where
        F: FnOnce(&mut Session) -> CoreResult<T>,
    {
        self.begin()?;
        match work(self) {
            Ok(value) => {
                let result = self.commit()?;
                Ok((value, result))
            }
            Err(err) => {
                if let Some(ctx) = self.tx.take() {
                    self.rollback_after_failure(ctx);
                }
                Err(err)
            }
        }
    }

    /// Closes the session, rolling back an open transaction.
    ///
    /// Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `ListenerAbort` if a before-rollback listener failed while
    /// rolling back; the session is closed regardless.
    pub fn close(&mut self) -> CoreResult<()> {
        if self.closed {
            return Ok(());
        }
        self.ensure_active()?;
        self.shutdown()
    }

    fn shutdown(&mut self) -> CoreResult<()> {
        self.closed = true;
        let outcome = match self.tx.take() {
            Some(ctx) => self.finish_rollback(ctx),
            None => Ok(()),
        };
        self.listeners.on_close(self.id);
        debug!(session = %self.id, "session closed");
        outcome
    }

    // =========================================================================
    // Records
    // =========================================================================

    /// Creates an unsaved record of a class.
    ///
    /// # Errors
    ///
    /// Returns `ClassNotFound` if the class does not exist.
    pub fn new_record(&self, class: &str) -> CoreResult<Record> {
        self.ensure_active()?;
        self.shared.schema.read().require_class(class)?;
        Ok(Record::new(class))
    }

    /// Loads a record.
    ///
    /// Inside a transaction, a record staged by it is returned as staged,
    /// and a record it deleted is reported as missing. The version of the
    /// first load of each record is remembered for validation at commit.
    ///
    /// # Errors
    ///
    /// Fails if the store is unavailable or the body cannot be decoded.
    pub fn load(&mut self, rid: Rid) -> CoreResult<Option<Record>> {
        self.ensure_active()?;
        if let Some(found) = self.staged_view(rid) {
            return Ok(found);
        }
        if !rid.is_persistent() {
            return Ok(None);
        }
        match self.shared.storage.load_record(rid)? {
            Some(stored) => self.materialize(rid, stored).map(Some),
            None => Ok(None),
        }
    }

    /// Returns the transaction's own view of a record, if it has one.
    fn staged_view(&self, rid: Rid) -> Option<Option<Record>> {
        match self.tx.as_ref()?.lookup(rid) {
            Lookup::Staged(record) | Lookup::Cached(record) => Some(Some(record.clone())),
            Lookup::Deleted => Some(None),
            Lookup::Unknown => None,
        }
    }

    fn materialize(&mut self, rid: Rid, stored: StoredRecord) -> CoreResult<Record> {
        let class = self
            .shared
            .schema
            .read()
            .class_for_collection(rid.collection_id())
            .map(str::to_string)
            .ok_or_else(|| {
                CoreError::invalid_operation(format!(
                    "collection {} of {rid} belongs to no class",
                    rid.collection_id()
                ))
            })?;
        let document = Document::from_bytes(&stored.body)?;
        let record = Record::loaded(rid, class, stored.version, document);
        self.shared.stats.record_load();
        if let Some(ctx) = self.tx.as_mut() {
            ctx.remember_load(&record);
        }
        Ok(record)
    }

    /// Returns every record of a class, optionally including subclasses.
    ///
    /// Inside a transaction the result reflects its staged creates, updates
    /// and deletes.
    ///
    /// # Errors
    ///
    /// Fails if the class does not exist or a record cannot be read.
    pub fn browse_class(&mut self, class: &str, polymorphic: bool) -> CoreResult<Vec<Record>> {
        self.ensure_active()?;
        let collections = self.shared.collections_of(class, polymorphic)?;
        let mut records = Vec::new();
        for collection in collections {
            for (rid, stored) in self.shared.storage.scan_collection(collection)? {
                match self.staged_view(rid) {
                    Some(Some(record)) => records.push(record),
                    Some(None) => {}
                    None => records.push(self.materialize(rid, stored)?),
                }
            }
        }
        if let Some(ctx) = &self.tx {
            let schema = self.shared.schema.read();
            for summary_rid in ctx.summary().created {
                if let Lookup::Staged(record) = ctx.lookup(summary_rid) {
                    let matches = record.class() == class
                        || (polymorphic && schema.is_subclass_of(record.class(), class));
                    if matches {
                        records.push(record.clone());
                    }
                }
            }
        }
        Ok(records)
    }

    fn index_definitions(&self, class: &str) -> CoreResult<Vec<IndexDefinition>> {
        let schema = self.shared.schema.read();
        schema.require_class(class)?;
        Ok(schema.indexes_for_class(class).into_iter().cloned().collect())
    }

    /// Saves a record.
    ///
    /// Inside a transaction the record is staged: a new record gets a
    /// temporary identity, and the index entries it contributes are
    /// updated in the transaction's overlay. Outside a transaction the save
    /// commits immediately and `record` receives its final identity and
    /// version.
    ///
    /// Either the whole index change of a save is staged or none of it.
    ///
    /// # Errors
    ///
    /// - `ClassNotFound` if the record's class does not exist
    /// - `InvalidKey` if a property cannot be used as an index key
    /// - `DuplicateKey` if a unique key already maps to another record in
    ///   this transaction's view
    /// - `RecordNotFound` if the transaction deleted the record
    pub fn save(&mut self, record: &mut Record) -> CoreResult<()> {
        self.ensure_active()?;
        if self.tx.is_none() {
            let ((), result) = self.run_in_transaction(|s| s.save(record))?;
            result.refresh(record);
            return Ok(());
        }

        let definitions = self.index_definitions(record.class())?;
        let new_keys = contributions(&definitions, record.document())?;
        let shared = Arc::clone(&self.shared);
        let ctx = self.active_context()?;

        let rid = record.rid();
        let (rid, write, mut old_keys) = if rid.is_unassigned() {
            (ctx.allocate_temporary(), PendingWrite::Create, Contributions::new())
        } else {
            match ctx.pending_write(rid) {
                Some(PendingWrite::Delete { .. }) => return Err(CoreError::RecordNotFound { rid }),
                Some(write) => (rid, write, ctx.contributions(rid).cloned().unwrap_or_default()),
                None if rid.is_temporary() => {
                    return Err(CoreError::invalid_operation(format!(
                        "{rid} was not created by this transaction"
                    )))
                }
                None => {
                    let expected = ctx.read_version(rid).unwrap_or(record.version());
                    let committed = committed_contributions(&shared, rid, &definitions)?;
                    (rid, PendingWrite::Update { expected }, committed)
                }
            }
        };
        old_keys.retain(|index, _| !ctx.overlay().is_cleared(index));

        let changes = diff(&old_keys, &new_keys);
        {
            let indexes = shared.indexes.read();
            let staged = ctx
                .overlay_mut()
                .apply_diffs(|name| indexes.get(name), rid, changes);
            if let Err(err) = staged {
                if let CoreError::DuplicateKey { index, key, .. } = &err {
                    shared.stats.record_duplicate_key();
                    warn!(tx = %ctx.id(), %index, %key, %rid, "duplicate key on save");
                }
                return Err(err);
            }
        }
        record.set_rid(rid);
        record.mark_clean();
        ctx.set_contributions(rid, new_keys);
        ctx.stage(record.clone(), write);
        trace!(tx = %ctx.id(), %rid, "record staged");
        Ok(())
    }

    /// Deletes a record.
    ///
    /// Deleting a record created in the same transaction simply forgets it.
    /// Outside a transaction the delete commits immediately.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` for a record that was never saved and
    /// `RecordNotFound` if the transaction already deleted it.
    pub fn delete(&mut self, record: &Record) -> CoreResult<()> {
        self.ensure_active()?;
        if self.tx.is_none() {
            self.run_in_transaction(|s| s.delete(record))?;
            return Ok(());
        }

        let rid = record.rid();
        if rid.is_unassigned() {
            return Err(CoreError::invalid_operation(
                "cannot delete a record that was never saved",
            ));
        }
        let definitions = self.index_definitions(record.class())?;
        let shared = Arc::clone(&self.shared);
        let ctx = self.active_context()?;

        let (mut old_keys, expected) = match ctx.pending_write(rid) {
            Some(PendingWrite::Create) => {
                let keys = ctx.contributions(rid).cloned().unwrap_or_default();
                remove_entries(ctx, rid, keys);
                ctx.unstage_create(rid);
                trace!(tx = %ctx.id(), %rid, "created record discarded");
                return Ok(());
            }
            Some(PendingWrite::Delete { .. }) => return Err(CoreError::RecordNotFound { rid }),
            Some(PendingWrite::Update { expected }) => {
                (ctx.contributions(rid).cloned().unwrap_or_default(), expected)
            }
            None if rid.is_temporary() => {
                return Err(CoreError::invalid_operation(format!(
                    "{rid} was not created by this transaction"
                )))
            }
            None => (
                committed_contributions(&shared, rid, &definitions)?,
                ctx.read_version(rid).unwrap_or(record.version()),
            ),
        };
        old_keys.retain(|index, _| !ctx.overlay().is_cleared(index));

        remove_entries(ctx, rid, old_keys);
        ctx.set_contributions(rid, Contributions::new());
        ctx.stage(record.clone(), PendingWrite::Delete { expected });
        trace!(tx = %ctx.id(), %rid, "record deletion staged");
        Ok(())
    }

    /// Removes every record of a class from storage and its entries from
    /// every index, optionally including subclasses. Returns the number of
    /// records removed.
    ///
    /// Runs with every commit stripe held, so no commit interleaves.
    ///
    /// # Errors
    ///
    /// Returns `TransactionState` while this session has a transaction
    /// open, or `ClassNotFound` for an unknown class.
    pub fn truncate_class(&mut self, class: &str, polymorphic: bool) -> CoreResult<u64> {
        self.ensure_active()?;
        if self.tx.is_some() {
            return Err(CoreError::transaction_state(
                "cannot truncate a class while a transaction is active",
            ));
        }

        let _guards = self.shared.locks.lock_all();
        let collections = self.shared.collections_of(class, polymorphic)?;
        let mut indexes = self.shared.indexes.write();

        let mut removed = 0;
        let mut truncated = BTreeSet::new();
        let mut failure = None;
        for collection in collections {
            match self.shared.storage.truncate_collection(collection) {
                Ok(count) => {
                    removed += count;
                    truncated.insert(collection);
                }
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }
        let entries = indexes.remove_records(&|rid| truncated.contains(&rid.collection_id()));
        drop(indexes);

        if let Some(err) = failure {
            warn!(class, error = %err, "truncate stopped part way");
            return Err(err.into());
        }
        self.shared.stats.record_truncation();
        info!(class, polymorphic, records = removed, entries, "class truncated");
        Ok(removed)
    }

    // =========================================================================
    // Transaction-aware index reads
    // =========================================================================

    fn read_index<T>(
        &self,
        index: &str,
        read: impl FnOnce(&dyn Index, &IndexOverlay) -> T,
    ) -> CoreResult<T> {
        self.ensure_active()?;
        self.shared.stats.record_index_lookup();
        let indexes = self.shared.indexes.read();
        let engine = indexes.get(index)?;
        let committed_only = IndexOverlay::new();
        let overlay = self.tx.as_ref().map_or(&committed_only, TransactionContext::overlay);
        Ok(read(engine, overlay))
    }

    /// Returns the records a key maps to.
    ///
    /// Query keys are coerced to the property types the same way saved
    /// values are, so `"30"` finds a record stored with `age = 30`. A key
    /// that cannot be coerced matches nothing.
    ///
    /// # Errors
    ///
    /// Returns `IndexNotFound` for an unknown index.
    pub fn index_get(&self, index: &str, key: impl Into<IndexKey>) -> CoreResult<Vec<Rid>> {
        let key = key.into();
        self.read_index(index, |engine, overlay| {
            normalize_key(engine.definition(), key)
                .map(|key| overlay.lookup(engine, &key))
                .unwrap_or_default()
        })
    }

    /// Returns the entries of a list of keys in key order.
    ///
    /// # Errors
    ///
    /// Returns `IndexNotFound` for an unknown index.
    pub fn index_entries(
        &self,
        index: &str,
        keys: &[IndexKey],
        ascending: bool,
    ) -> CoreResult<Vec<(IndexKey, Rid)>> {
        self.read_index(index, |engine, overlay| {
            let keys: Vec<IndexKey> = keys
                .iter()
                .filter_map(|key| normalize_key(engine.definition(), key.clone()))
                .collect();
            overlay.entries(engine, &keys, ascending)
        })
    }

    /// Returns the entries whose key lies between two bounds.
    ///
    /// # Errors
    ///
    /// Returns `IndexNotFound` for an unknown index.
    pub fn index_range(
        &self,
        index: &str,
        from: Bound<IndexKey>,
        to: Bound<IndexKey>,
        ascending: bool,
    ) -> CoreResult<Vec<(IndexKey, Rid)>> {
        self.read_index(index, |engine, overlay| {
            match (
                normalize_bound(engine.definition(), from),
                normalize_bound(engine.definition(), to),
            ) {
                (Some(from), Some(to)) => overlay.range(engine, from.as_ref(), to.as_ref(), ascending),
                _ => Vec::new(),
            }
        })
    }

    /// Returns the number of entries in an index.
    ///
    /// # Errors
    ///
    /// Returns `IndexNotFound` for an unknown index.
    pub fn index_size(&self, index: &str) -> CoreResult<usize> {
        self.read_index(index, |engine, overlay| overlay.size(engine))
    }

    /// Clears an index within the open transaction. Committed entries are
    /// hidden from the transaction and removed when it commits.
    ///
    /// # Errors
    ///
    /// Returns `TransactionState` outside a transaction, or
    /// `IndexNotFound` for an unknown index.
    pub fn index_clear(&mut self, index: &str) -> CoreResult<()> {
        self.ensure_active()?;
        self.shared.indexes.read().get(index)?;
        let ctx = self.active_context()?;
        ctx.overlay_mut().clear(index);
        ctx.forget_index(index);
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(err) = self.shutdown() {
                warn!(session = %self.id, error = %err, "error while dropping session");
            }
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("transaction", &self.transaction_id())
            .field("listeners", &self.listeners.len())
            .field("closed", &self.closed)
            .finish()
    }
}

/// Keys the committed body of a record contributes.
fn committed_contributions(
    shared: &Shared,
    rid: Rid,
    definitions: &[IndexDefinition],
) -> CoreResult<Contributions> {
    match shared.storage.load_record(rid)? {
        Some(stored) => contributions(definitions, &Document::from_bytes(&stored.body)?),
        None => Ok(Contributions::new()),
    }
}

fn remove_entries(ctx: &mut TransactionContext, rid: Rid, keys: Contributions) {
    let overlay = ctx.overlay_mut();
    for (index, keys) in keys {
        for key in keys {
            overlay.remove(&index, key, rid);
        }
    }
}

fn normalize_bound(definition: &IndexDefinition, bound: Bound<IndexKey>) -> Option<Bound<IndexKey>> {
    Some(match bound {
        Bound::Included(key) => Bound::Included(normalize_key(definition, key)?),
        Bound::Excluded(key) => Bound::Excluded(normalize_key(definition, key)?),
        Bound::Unbounded => Bound::Unbounded,
    })
}
