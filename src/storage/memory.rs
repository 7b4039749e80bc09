//! In-memory record store.
//!
//! This is the reference implementation of `RecordStore`.
//! It uses a single `HashMap` protected by one `RwLock`.
//!
//! ## Limitations
//!
//! - **No persistence**: dropping the store drops the data.
//! - **Global write lock**: every compare-and-swap serializes on the same
//!   lock. The lock is only held for the compare+write itself, never across
//!   a transaction or a lock wait.
//!
//! Use this store for:
//! - Testing the transaction and locking layers
//! - Embedding in applications that don't need persistence

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use parking_lot::RwLock;

use crate::model::*;
use crate::{Error, Result};
use super::{conflict, RecordStore};

// ============================================================================
// MemoryStore
// ============================================================================

/// In-memory versioned record storage.
pub struct MemoryStore {
    records: RwLock<HashMap<RecordId, Record>>,
    next_id: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// RecordStore impl
// ============================================================================

impl RecordStore for MemoryStore {
    fn next_id(&self) -> RecordId {
        RecordId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn insert(&self, id: RecordId, fields: FieldMap) -> Result<Record> {
        let mut records = self.records.write();
        if records.contains_key(&id) {
            return Err(Error::AlreadyExists(id));
        }
        let record = Record::new(id, fields);
        records.insert(id, record.clone());
        Ok(record)
    }

    fn get(&self, id: RecordId) -> Result<Record> {
        self.records.read().get(&id).cloned().ok_or(Error::NotFound(id))
    }

    fn version_of(&self, id: RecordId) -> Option<Version> {
        self.records.read().get(&id).map(|r| r.version)
    }

    fn update(&self, id: RecordId, fields: FieldMap, expected: Version) -> Result<Record> {
        let mut records = self.records.write();
        let record = records.get_mut(&id).ok_or(Error::NotFound(id))?;
        if record.version != expected {
            return Err(conflict(id, expected, Some(record.version)));
        }
        record.fields = fields;
        record.version = expected.next();
        Ok(record.clone())
    }

    fn delete(&self, id: RecordId, expected: Version) -> Result<Record> {
        let mut records = self.records.write();
        let current = records.get(&id).ok_or(Error::NotFound(id))?.version;
        if current != expected {
            return Err(conflict(id, expected, Some(current)));
        }
        records.remove(&id).ok_or(Error::NotFound(id))
    }

    fn restore(&self, record: Record) {
        self.records.write().insert(record.id, record);
    }

    fn remove(&self, id: RecordId) -> Option<Record> {
        self.records.write().remove(&id)
    }

    fn ids(&self) -> Vec<RecordId> {
        let mut ids: Vec<RecordId> = self.records.read().keys().copied().collect();
        ids.sort();
        ids
    }

    fn len(&self) -> usize {
        self.records.read().len()
    }

    fn snapshot(&self) -> Vec<Record> {
        let mut all: Vec<Record> = self.records.read().values().cloned().collect();
        all.sort_by_key(|r| r.id);
        all
    }
}

// ============================================================================
// Tests
// ============================================================================
