//! Transaction manager: read/write paths and the commit protocol.
//!
//! ## Commit sequence
//!
//! ```text
//! 1. Take exclusive locks on every record the commit will mutate
//!    (ascending id order). Blocks behind pessimistic readers.
//! 2. Take the commit mutex.
//! 3. Validate the read set: every record read must still be at its
//!    snapshot version. Mismatch -> OptimisticConflict, roll back.
//! 4. Apply the write set through the store's compare-and-swap calls,
//!    recording an undo entry per applied op. Any failure undoes the
//!    applied prefix and rolls back.
//! 5. Release every lock, mark Committed.
//! ```
//!
//! Step 3 runs even for transactions that wrote nothing: having read a
//! record is enough to be obliged to see it unchanged at commit.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::EngineConfig;
use crate::lock::{LockManager, LockMode};
use crate::model::{FieldMap, Record, RecordId};
use crate::storage::{conflict, RecordStore};
use crate::{Error, Result};
use super::{Transaction, TxId, TxMode, TxOptions, TxState, WriteOp};

/// Reverse of one applied write.
enum Undo {
    Restore(Record),
    Remove(RecordId),
}

/// Coordinates transactions over one shared [`RecordStore`].
///
/// Share it between threads with `Arc`. Each [`Transaction`] it hands out is
/// owned by one caller and is `Send`.
///
/// # Thread Safety
///
/// Validation and apply run under `commit_lock`, so no other commit can
/// change a record between the moment it is validated and the moment this
/// commit's writes land. Lock waits happen before the mutex is taken.
pub struct TransactionManager<S: RecordStore> {
    store: Arc<S>,
    locks: Arc<LockManager>,
    config: EngineConfig,
    next_tx_id: AtomicU64,
    commit_lock: Mutex<()>,
}

impl<S: RecordStore> TransactionManager<S> {
    pub fn new(store: S) -> Self {
        Self::with_config(store, EngineConfig::default())
    }

    pub fn with_config(store: S, config: EngineConfig) -> Self {
        Self {
            store: Arc::new(store),
            locks: Arc::new(LockManager::new()),
            config,
            next_tx_id: AtomicU64::new(1),
            commit_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn lock_manager(&self) -> &Arc<LockManager> {
        &self.locks
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ========================================================================
    // Begin
    // ========================================================================

    pub fn begin(&self, mode: TxMode) -> Transaction {
        self.begin_with(TxOptions::new(mode))
    }

    /// Begin in the configured default mode.
    pub fn begin_default(&self) -> Transaction {
        self.begin(self.config.default_mode)
    }

    pub fn begin_with(&self, options: TxOptions) -> Transaction {
        let id = TxId(self.next_tx_id.fetch_add(1, Ordering::Relaxed));
        tracing::debug!(tx = %id, mode = ?options.mode, read_only = options.read_only, "begin");
        Transaction::new(id, options, Arc::clone(&self.locks))
    }

    // ========================================================================
    // Read path
    // ========================================================================

    /// Read a record through `tx`.
    ///
    /// The first read of a record captures its snapshot (and, in pessimistic
    /// modes, its lock); later reads return what this transaction sees,
    /// including its own buffered writes.
    pub fn read(&self, tx: &mut Transaction, id: RecordId) -> Result<Record> {
        tx.ensure_active()?;
        if let Some(seen) = tx.local_view(id) {
            return seen;
        }

        if let Some(mode) = tx.mode.read_lock() {
            self.lock(tx, id, mode)?;
        }

        let record = self.store.get(id)?;
        tracing::debug!(tx = %tx.id, record = %id, version = %record.version, "read");
        tx.reads.insert(id, record.clone());
        Ok(record)
    }

    // ========================================================================
    // Write path
    // ========================================================================

    /// Buffer new fields for an existing record.
    ///
    /// Returns the record as it will be once committed. Fails fast with
    /// `OptimisticConflict` (and rolls `tx` back) if the record has already
    /// moved past this transaction's snapshot.
    pub fn write(&self, tx: &mut Transaction, id: RecordId, fields: FieldMap) -> Result<Record> {
        tx.ensure_writable()?;
        match tx.writes.get_mut(&id) {
            Some(WriteOp::Insert(pending)) => {
                *pending = fields.clone();
                return Ok(Record::new(id, fields));
            }
            Some(WriteOp::Delete) => return Err(Error::NotFound(id)),
            Some(WriteOp::Update(_)) | None => {}
        }

        let base = self.prepare_mutation(tx, id)?;
        tracing::debug!(tx = %tx.id, record = %id, base = %base.version, "buffered update");
        tx.writes.insert(id, WriteOp::Update(fields.clone()));
        Ok(Record { id, fields, version: base.version.next() })
    }

    /// Buffer a new record. The id is reserved immediately.
    pub fn create(&self, tx: &mut Transaction, fields: FieldMap) -> Result<RecordId> {
        tx.ensure_writable()?;
        let id = self.store.next_id();
        tracing::debug!(tx = %tx.id, record = %id, "buffered insert");
        tx.writes.insert(id, WriteOp::Insert(fields));
        Ok(id)
    }

    /// Buffer removal of an existing record.
    pub fn delete(&self, tx: &mut Transaction, id: RecordId) -> Result<()> {
        tx.ensure_writable()?;
        match tx.writes.get(&id) {
            Some(WriteOp::Insert(_)) => {
                tx.writes.remove(&id);
                return Ok(());
            }
            Some(WriteOp::Delete) => return Err(Error::NotFound(id)),
            Some(WriteOp::Update(_)) | None => {}
        }

        self.prepare_mutation(tx, id)?;
        tracing::debug!(tx = %tx.id, record = %id, "buffered delete");
        tx.writes.insert(id, WriteOp::Delete);
        Ok(())
    }

    /// Snapshot + lock + early version check shared by update and delete.
    fn prepare_mutation(&self, tx: &mut Transaction, id: RecordId) -> Result<Record> {
        if !tx.reads.contains_key(&id) {
            self.read(tx, id)?;
        }
        if tx.mode.is_pessimistic() {
            self.lock(tx, id, LockMode::Exclusive)?;
        }

        let base = tx.reads.get(&id).cloned().ok_or(Error::NotFound(id))?;
        let current = self.store.version_of(id);
        if current != Some(base.version) {
            return Err(self.abort(tx, conflict(id, base.version, current)));
        }
        Ok(base)
    }

    // ========================================================================
    // Commit / rollback
    // ========================================================================

    /// Validate and apply `tx`.
    ///
    /// On any error the transaction is rolled back, its locks are released,
    /// and the store is left exactly as it was before the commit started.
    pub fn commit(&self, tx: &mut Transaction) -> Result<()> {
        tx.ensure_active()?;

        for id in self.mutated_ids(tx) {
            self.lock(tx, id, LockMode::Exclusive)?;
        }

        let outcome = {
            let _commit_guard = self.commit_lock.lock();
            self.validate(tx).and_then(|()| self.apply(tx))
        };

        match outcome {
            Ok(applied) => {
                tx.finish(TxState::Committed);
                tracing::debug!(tx = %tx.id, mode = ?tx.mode, applied, "committed");
                Ok(())
            }
            Err(e) => Err(self.abort(tx, e)),
        }
    }

    /// Roll back `tx`. No-op if it already finished.
    pub fn rollback(&self, tx: &mut Transaction) {
        tx.rollback();
    }

    /// Existing records this commit will change, ascending.
    fn mutated_ids(&self, tx: &Transaction) -> Vec<RecordId> {
        let mut ids: Vec<RecordId> = tx
            .writes
            .iter()
            .filter(|(_, op)| !matches!(op, WriteOp::Insert(_)))
            .map(|(id, _)| *id)
            .collect();
        if tx.mode.forces_increment() {
            ids.extend(tx.reads.keys().copied().filter(|id| !tx.writes.contains_key(id)));
            ids.sort();
        }
        ids
    }

    /// Every record read must still be at its snapshot version.
    fn validate(&self, tx: &Transaction) -> Result<()> {
        for (id, version) in tx.read_set() {
            let current = self.store.version_of(id);
            if current != Some(version) {
                return Err(conflict(id, version, current));
            }
        }
        Ok(())
    }

    /// Apply the write set; on failure undo whatever already landed.
    fn apply(&self, tx: &Transaction) -> Result<usize> {
        let mut undo: Vec<Undo> = Vec::with_capacity(tx.writes.len());

        match self.apply_ops(tx, &mut undo) {
            Ok(()) => Ok(undo.len()),
            Err(e) => {
                tracing::warn!(tx = %tx.id, undone = undo.len(), error = %e, "apply failed, undoing");
                for entry in undo.into_iter().rev() {
                    match entry {
                        Undo::Restore(record) => self.store.restore(record),
                        Undo::Remove(id) => {
                            self.store.remove(id);
                        }
                    }
                }
                Err(e)
            }
        }
    }

    fn apply_ops(&self, tx: &Transaction, undo: &mut Vec<Undo>) -> Result<()> {
        for (&id, op) in &tx.writes {
            match op {
                WriteOp::Insert(fields) => {
                    self.store.insert(id, fields.clone())?;
                    undo.push(Undo::Remove(id));
                }
                WriteOp::Update(fields) => {
                    let base = tx.reads.get(&id).ok_or(Error::NotFound(id))?;
                    self.store.update(id, fields.clone(), base.version)?;
                    undo.push(Undo::Restore(base.clone()));
                }
                WriteOp::Delete => {
                    let base = tx.reads.get(&id).ok_or(Error::NotFound(id))?;
                    let removed = self.store.delete(id, base.version)?;
                    undo.push(Undo::Restore(removed));
                }
            }
        }
        if tx.mode.forces_increment() {
            for (id, base) in tx.reads.iter().filter(|(id, _)| !tx.writes.contains_key(*id)) {
                self.store.update(*id, base.fields.clone(), base.version)?;
                undo.push(Undo::Restore(base.clone()));
            }
        }
        Ok(())
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn lock(&self, tx: &mut Transaction, id: RecordId, mode: LockMode) -> Result<()> {
        self.locks
            .acquire(tx.id, id, mode, self.config.lock_timeout)
            .map_err(|e| self.abort(tx, e))
    }

    /// Roll `tx` back because of `err` and hand `err` back to the caller.
    fn abort(&self, tx: &mut Transaction, err: Error) -> Error {
        tracing::warn!(tx = %tx.id, mode = ?tx.mode, error = %err, "transaction aborted");
        tx.rollback();
        err
    }
}

// ============================================================================
// Tests
// ============================================================================
