//! # Record Store Trait
//!
//! This is THE contract between the transaction layer and any storage engine.
//! Every operation the transaction manager needs is defined here.
//!
//! ## Implementations
//!
//! | Store | Module | Description |
//! |-------|--------|-------------|
//! | `MemoryStore` | `memory` | In-memory map for testing/embedding |
//!
//! ## Atomicity contract
//!
//! `update` and `delete` are compare-and-swap on the record version: the
//! check and the write happen under one critical section, so two callers
//! racing with the same `expected` version cannot both succeed. Nothing else
//! in the trait is required to be atomic with respect to other calls.

pub mod memory;

use crate::model::*;
use crate::{Error, Result};

pub use memory::MemoryStore;

// ============================================================================
// Store Configuration
// ============================================================================

/// Which store implementation to open.
#[derive(Debug, Clone, Default)]
pub enum StoreConfig {
    /// In-memory (no persistence)
    #[default]
    Memory,
}

// ============================================================================
// RecordStore Trait
// ============================================================================

/// The versioned record storage contract.
///
/// Stores never see transactions. They only offer single-record atomic
/// operations; the transaction manager composes them into commits.
pub trait RecordStore: Send + Sync + 'static {
    // ========================================================================
    // Id allocation
    // ========================================================================

    /// Allocate a fresh id. Ids are never reused, even if the insert that
    /// reserved one is rolled back.
    fn next_id(&self) -> RecordId;

    // ========================================================================
    // Create / read
    // ========================================================================

    /// Create a record at a pre-allocated id with `version = 0`.
    ///
    /// Fails with `AlreadyExists` if the id is taken.
    fn insert(&self, id: RecordId, fields: FieldMap) -> Result<Record>;

    /// Create a record at a fresh id with `version = 0`.
    fn create(&self, fields: FieldMap) -> Result<Record> {
        let id = self.next_id();
        self.insert(id, fields)
    }

    /// Fetch a record. Fails with `NotFound` if absent.
    fn get(&self, id: RecordId) -> Result<Record>;

    /// Current version of a record, or `None` if absent.
    ///
    /// Default: full `get`. Override when a version probe is cheaper.
    fn version_of(&self, id: RecordId) -> Option<Version> {
        self.get(id).ok().map(|r| r.version)
    }

    fn contains(&self, id: RecordId) -> bool {
        self.version_of(id).is_some()
    }

    // ========================================================================
    // Versioned mutation
    // ========================================================================

    /// Replace the fields of `id` iff its version equals `expected`, and set
    /// `version = expected + 1`.
    ///
    /// Fails with `OptimisticConflict` on mismatch, `NotFound` if absent.
    fn update(&self, id: RecordId, fields: FieldMap, expected: Version) -> Result<Record>;

    /// Remove `id` iff its version equals `expected`. Returns the removed record.
    fn delete(&self, id: RecordId, expected: Version) -> Result<Record>;

    // ========================================================================
    // Undo support
    // ========================================================================

    /// Unconditionally put `record` back, version included.
    ///
    /// Only for undoing a partially applied commit.
    fn restore(&self, record: Record);

    /// Unconditionally remove `id`. Only for undoing an insert.
    fn remove(&self, id: RecordId) -> Option<Record>;

    // ========================================================================
    // Introspection
    // ========================================================================

    /// All record ids, ascending.
    fn ids(&self) -> Vec<RecordId>;

    fn len(&self) -> usize {
        self.ids().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every record, ordered by id.
    ///
    /// Default: `get` per id. Not a consistent snapshot under concurrent writes.
    fn snapshot(&self) -> Vec<Record> {
        self.ids().into_iter().filter_map(|id| self.get(id).ok()).collect()
    }
}

/// Build the `OptimisticConflict` error for a failed compare-and-swap.
pub(crate) fn conflict(id: RecordId, expected: Version, actual: Option<Version>) -> Error {
    Error::OptimisticConflict { id, expected, actual }
}
