//! # Service Facade
//!
//! Transaction-per-call operations for callers that don't want to manage
//! transactions themselves, plus pass-throughs for those that do.
//!
//! Every facade call is demarcated explicitly: begin, run, commit on `Ok`,
//! roll back on `Err`. Read-only calls still commit, so a read under
//! `TxMode::Optimistic` still gets its version re-checked.

pub mod article;

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::model::{FieldMap, Record, RecordId};
use crate::storage::{MemoryStore, RecordStore, StoreConfig};
use crate::tx::{Transaction, TransactionManager, TxMode, TxOptions};
use crate::Result;

pub use article::ArticleService;

/// Record-level facade over a shared [`TransactionManager`].
///
/// Cheap to clone; clones share the same store and lock table.
pub struct RecordService<S: RecordStore> {
    manager: Arc<TransactionManager<S>>,
}

impl<S: RecordStore> Clone for RecordService<S> {
    fn clone(&self) -> Self {
        Self { manager: Arc::clone(&self.manager) }
    }
}

/// In-memory store for testing and embedding.
impl RecordService<MemoryStore> {
    pub fn open_memory() -> Self {
        Self::open(StoreConfig::Memory, EngineConfig::default())
    }

    pub fn open(store: StoreConfig, config: EngineConfig) -> Self {
        match store {
            StoreConfig::Memory => Self::with_config(MemoryStore::new(), config),
        }
    }
}

impl<S: RecordStore> RecordService<S> {
    pub fn new(store: S) -> Self {
        Self::with_config(store, EngineConfig::default())
    }

    pub fn with_config(store: S, config: EngineConfig) -> Self {
        Self::from_manager(Arc::new(TransactionManager::with_config(store, config)))
    }

    pub fn from_manager(manager: Arc<TransactionManager<S>>) -> Self {
        Self { manager }
    }

    /// Access the underlying manager (for explicit transactions).
    pub fn manager(&self) -> &Arc<TransactionManager<S>> {
        &self.manager
    }

    pub fn store(&self) -> &S {
        self.manager.store()
    }

    // ========================================================================
    // Transaction-per-call operations
    // ========================================================================

    /// Create a record in its own `None`-mode transaction and return its id.
    pub fn save_record(&self, fields: FieldMap) -> Result<RecordId> {
        let id = self.in_transaction(TxMode::None, |m, tx| m.create(tx, fields))?;
        tracing::debug!(record = %id, "saved");
        Ok(id)
    }

    /// Read a record in its own transaction of the given mode.
    ///
    /// The commit still runs read-set validation, so this can fail with
    /// `OptimisticConflict` if the record changes between read and commit.
    pub fn get_record(&self, id: RecordId, mode: TxMode) -> Result<Record> {
        self.in_transaction(mode, |m, tx| m.read(tx, id))
    }

    /// Same as [`get_record`](Self::get_record), in a read-only transaction.
    pub fn get_record_read_only(&self, id: RecordId, mode: TxMode) -> Result<Record> {
        self.in_transaction(TxOptions::new(mode).read_only(), |m, tx| m.read(tx, id))
    }

    /// Run `f` in a fresh transaction: commit if it returns `Ok`, roll back
    /// otherwise.
    pub fn in_transaction<T, F>(&self, options: impl Into<TxOptions>, f: F) -> Result<T>
    where
        F: FnOnce(&TransactionManager<S>, &mut Transaction) -> Result<T>,
    {
        let mut tx = self.manager.begin_with(options.into());
        match f(&self.manager, &mut tx) {
            Ok(value) => {
                self.manager.commit(&mut tx)?;
                Ok(value)
            }
            Err(e) => {
                self.manager.rollback(&mut tx);
                Err(e)
            }
        }
    }

    // ========================================================================
    // Explicit transactions
    // ========================================================================

    pub fn begin(&self, mode: TxMode) -> Transaction {
        self.manager.begin(mode)
    }

    pub fn begin_with(&self, options: TxOptions) -> Transaction {
        self.manager.begin_with(options)
    }

    /// Buffer an update to `id` inside `tx`.
    ///
    /// Returns the record as it will be after commit (`version = snapshot + 1`).
    pub fn update_record(&self, tx: &mut Transaction, id: RecordId, fields: FieldMap) -> Result<Record> {
        self.manager.write(tx, id, fields)
    }

    pub fn commit(&self, tx: &mut Transaction) -> Result<()> {
        self.manager.commit(tx)
    }

    pub fn rollback(&self, tx: &mut Transaction) {
        self.manager.rollback(tx)
    }
}

// ============================================================================
// Tests
// ============================================================================
