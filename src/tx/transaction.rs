//! Per-transaction state: snapshot cache, read set, buffered write set.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::lock::LockManager;
use crate::model::{FieldMap, Record, RecordId, Version};
use crate::{Error, Result};
use super::{TxId, TxMode, TxOptions, TxState};

/// A buffered mutation, applied to the store only at commit.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// New record at an id reserved by this transaction.
    Insert(FieldMap),
    /// Replace the fields of an existing record.
    Update(FieldMap),
    /// Remove an existing record.
    Delete,
}

/// An open (or finished) transaction.
///
/// Created by [`TransactionManager::begin`](super::TransactionManager::begin).
/// Holds every record it has read, as first seen: repeated reads return
/// that snapshot, and its version is what commit validates against.
///
/// Dropping an active transaction rolls it back and releases its locks.
pub struct Transaction {
    pub(crate) id: TxId,
    pub(crate) mode: TxMode,
    pub(crate) read_only: bool,
    pub(crate) state: TxState,
    /// First-read snapshot per record; the read set is its key → version view.
    pub(crate) reads: HashMap<RecordId, Record>,
    /// Ordered so commit takes write locks in a stable order.
    pub(crate) writes: BTreeMap<RecordId, WriteOp>,
    locks: Arc<LockManager>,
}

impl Transaction {
    pub(crate) fn new(id: TxId, options: TxOptions, locks: Arc<LockManager>) -> Self {
        Self {
            id,
            mode: options.mode,
            read_only: options.read_only,
            state: TxState::Active,
            reads: HashMap::new(),
            writes: BTreeMap::new(),
            locks,
        }
    }

    pub fn id(&self) -> TxId { self.id }
    pub fn mode(&self) -> TxMode { self.mode }
    pub fn state(&self) -> TxState { self.state }
    pub fn is_active(&self) -> bool { self.state == TxState::Active }
    pub fn is_read_only(&self) -> bool { self.read_only }

    /// Version captured when `id` was first read, if it was.
    pub fn snapshot_version(&self, id: RecordId) -> Option<Version> {
        self.reads.get(&id).map(|r| r.version)
    }

    /// The read set: every record read so far with its snapshot version.
    pub fn read_set(&self) -> impl Iterator<Item = (RecordId, Version)> + '_ {
        self.reads.iter().map(|(id, r)| (*id, r.version))
    }

    /// Buffered writes, ordered by record id.
    pub fn write_set(&self) -> impl Iterator<Item = (RecordId, &WriteOp)> + '_ {
        self.writes.iter().map(|(id, op)| (*id, op))
    }

    pub fn has_writes(&self) -> bool {
        !self.writes.is_empty()
    }

    pub(crate) fn ensure_active(&self) -> Result<()> {
        if self.state.is_terminal() {
            return Err(Error::TxClosed { tx: self.id, state: self.state });
        }
        Ok(())
    }

    pub(crate) fn ensure_writable(&self) -> Result<()> {
        self.ensure_active()?;
        if self.read_only {
            return Err(Error::ReadOnly(self.id));
        }
        Ok(())
    }

    /// The record as this transaction currently sees it, if it has touched it.
    ///
    /// `Some(Err(NotFound))` means the transaction itself deleted it.
    pub(crate) fn local_view(&self, id: RecordId) -> Option<Result<Record>> {
        match self.writes.get(&id) {
            Some(WriteOp::Insert(fields)) => Some(Ok(Record::new(id, fields.clone()))),
            Some(WriteOp::Update(fields)) => {
                let base = self.reads.get(&id)?.version;
                Some(Ok(Record { id, fields: fields.clone(), version: base.next() }))
            }
            Some(WriteOp::Delete) => Some(Err(Error::NotFound(id))),
            None => self.reads.get(&id).cloned().map(Ok),
        }
    }

    /// Move to a terminal state, dropping buffered work and every lock.
    ///
    /// Returns `false` if the transaction was already terminal.
    pub(crate) fn finish(&mut self, state: TxState) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = state;
        self.writes.clear();
        self.locks.release_all(self.id);
        true
    }

    /// Discard the write set and release locks. No-op once terminal.
    pub fn rollback(&mut self) {
        if self.finish(TxState::RolledBack) {
            self.reads.clear();
            tracing::debug!(tx = %self.id, "rolled back");
        }
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.is_active() {
            tracing::debug!(tx = %self.id, mode = ?self.mode, "dropped while active, rolling back");
            self.rollback();
        }
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("mode", &self.mode)
            .field("read_only", &self.read_only)
            .field("state", &self.state)
            .field("reads", &self.reads.len())
            .field("writes", &self.writes.len())
            .finish()
    }
}
