//! Commit pipeline.

use crate::database::Shared;
use crate::error::{CoreError, CoreResult};
use crate::index::{IndexChangeSet, IndexKey};
use crate::mvcc::{validate_versions, LockTarget};
use crate::record::Record;
use crate::transaction::context::{PendingWrite, TransactionContext};
use crate::types::TransactionId;
use kestrel_storage::{RecordWrite, Rid, Version};
use std::collections::{BTreeMap, HashMap};
use tracing::trace;

/// Outcome of a successful commit.
///
/// Records created in the transaction carried temporary identities until
/// now; `remap` maps each of them to its final identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitResult {
    /// The committed transaction.
    pub transaction_id: TransactionId,
    /// Temporary identity to final identity, for every created record.
    pub remap: BTreeMap<Rid, Rid>,
    /// New version of every created or updated record, by final identity.
    pub versions: BTreeMap<Rid, Version>,
    /// Deleted records.
    pub deleted: Vec<Rid>,
}

impl CommitResult {
    /// Returns the final identity of a record touched by the transaction.
    #[must_use]
    pub fn resolve(&self, rid: Rid) -> Rid {
        self.remap.get(&rid).copied().unwrap_or(rid)
    }

    /// Returns the committed version of a created or updated record.
    #[must_use]
    pub fn version(&self, rid: Rid) -> Option<Version> {
        self.versions.get(&self.resolve(rid)).copied()
    }

    /// Brings a caller-held copy of a committed record up to date: final
    /// identity, new version and remapped links.
    pub fn refresh(&self, record: &mut Record) {
        let rid = self.resolve(record.rid());
        record.set_rid(rid);
        if let Some(version) = self.versions.get(&rid) {
            record.set_version(*version);
        }
        record.document_mut().visit_links_mut(&mut |collection, position| {
            if let Some(target) = self.remap.get(&Rid::new(*collection, *position)) {
                *collection = target.collection_id();
                *position = target.position();
            }
        });
        record.mark_clean();
    }
}

struct PreparedCommit {
    writes: Vec<RecordWrite>,
    index_changes: Vec<IndexChangeSet>,
    remap: HashMap<Rid, Rid>,
}

/// Runs validation and apply for a transaction.
///
/// On success the record store and the committed indexes both hold the
/// transaction's changes. On failure neither was touched, apart from
/// identities allocated for created records, which are not reused.
pub(crate) fn commit(shared: &Shared, ctx: &TransactionContext) -> CoreResult<CommitResult> {
    let changes = ctx.overlay().change_sets();

    // Unique keys holding temporary links lock the stripe of their temporary
    // form, which need not match the final key. The second verify under the
    // index write lock below is what serializes those keys.
    let unique_adds: Vec<(&str, &IndexKey)> = {
        let indexes = shared.indexes.read();
        changes
            .iter()
            .filter(|set| indexes.is_unique(&set.index))
            .flat_map(|set| set.adds.iter().map(move |(key, _)| (set.index.as_str(), key)))
            .collect()
    };
    let _guards = if ctx.overlay().has_cleared_index() {
        shared.locks.lock_all()
    } else {
        let records = ctx.version_checks().map(|(rid, _)| LockTarget::Record(rid));
        let keys = unique_adds
            .iter()
            .map(|(index, key)| LockTarget::UniqueKey(index, key));
        shared.locks.lock(records.chain(keys))
    };

    validate_versions(shared.storage.as_ref(), ctx.version_checks())?;
    shared.indexes.read().verify_unique(&changes)?;

    let prepared = prepare(shared, ctx)?;
    let outcomes = {
        let mut indexes = shared.indexes.write();
        // Keys holding temporary links only become comparable after remapping.
        indexes.verify_unique(&prepared.index_changes)?;
        let outcomes = shared.storage.apply_batch(prepared.writes)?;
        indexes.apply(&prepared.index_changes);
        outcomes
    };

    let mut versions = BTreeMap::new();
    let mut deleted = Vec::new();
    for outcome in outcomes {
        match outcome.version {
            Some(version) => {
                versions.insert(outcome.rid, version);
            }
            None => deleted.push(outcome.rid),
        }
    }
    Ok(CommitResult {
        transaction_id: ctx.id(),
        remap: prepared.remap.into_iter().collect(),
        versions,
        deleted,
    })
}

/// Allocates identities, encodes bodies and rewrites pending index changes
/// to final identities.
fn prepare(shared: &Shared, ctx: &TransactionContext) -> CoreResult<PreparedCommit> {
    let mut remap = HashMap::with_capacity(ctx.creation_order().len());
    {
        let schema = shared.schema.read();
        for rid in ctx.creation_order() {
            let Some(staged) = ctx.staged(*rid) else {
                continue;
            };
            let class = schema.require_class(staged.record.class())?;
            let target = shared.storage.allocate_identity(shared.place(class))?;
            trace!(temporary = %rid, %target, "identity allocated");
            remap.insert(*rid, target);
        }
    }

    let mut writes = Vec::with_capacity(ctx.staged_len());
    for rid in ctx.creation_order() {
        let (Some(staged), Some(target)) = (ctx.staged(*rid), remap.get(rid)) else {
            continue;
        };
        writes.push(RecordWrite::Create {
            rid: *target,
            body: encode(&staged.record, &remap)?,
        });
    }
    for (rid, staged) in ctx.staged_records() {
        match staged.write {
            PendingWrite::Create => {}
            PendingWrite::Update { expected } => writes.push(RecordWrite::Update {
                rid: *rid,
                body: encode(&staged.record, &remap)?,
                expected,
            }),
            PendingWrite::Delete { expected } => writes.push(RecordWrite::Delete {
                rid: *rid,
                expected,
            }),
        }
    }

    let mut overlay = ctx.overlay().clone();
    overlay.remap(&remap);
    Ok(PreparedCommit {
        writes,
        index_changes: overlay.change_sets(),
        remap,
    })
}

/// Encodes a record body with temporary links replaced by final identities.
fn encode(record: &Record, remap: &HashMap<Rid, Rid>) -> CoreResult<Vec<u8>> {
    let mut document = record.document().clone();
    let mut dangling = None;
    document.visit_links_mut(&mut |collection, position| {
        let link = Rid::new(*collection, *position);
        if !link.is_temporary() {
            return;
        }
        match remap.get(&link) {
            Some(target) => {
                *collection = target.collection_id();
                *position = target.position();
            }
            None => {
                dangling.get_or_insert(link);
            }
        }
    });
    if let Some(link) = dangling {
        return Err(CoreError::invalid_operation(format!(
            "{} links to {link}, which is not created by this transaction",
            record.rid()
        )));
    }
    Ok(document.to_bytes()?)
}
