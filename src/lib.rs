//! # optlock — versioned records with optimistic and pessimistic locking
//!
//! An in-process record store where every record carries a `@Version`-style
//! counter, transactions validate what they read at commit time, and
//! pessimistic transactions hold shared/exclusive record locks.
//!
//! ## Design Principles
//!
//! 1. **Trait-first**: `RecordStore` is the contract between the transaction layer and storage
//! 2. **Clean DTOs**: `Record`, `Value`, `FieldMap` cross all boundaries
//! 3. **Explicit demarcation**: `begin` / `commit` / `rollback`, no ambient transactions
//! 4. **Explicit write sets**: callers hand over new fields, nothing is dirty-checked
//!
//! ## Quick Start
//!
//! ```rust
//! use optlock::{RecordService, TxMode, Error};
//! use optlock::model::field_map::fields;
//!
//! let svc = RecordService::open_memory();
//! let id = svc.save_record(fields([("title", "A")])).unwrap();
//!
//! // Read under OPTIMISTIC: the commit re-checks the version.
//! let mut t1 = svc.begin(TxMode::Optimistic);
//! svc.manager().read(&mut t1, id).unwrap();
//!
//! // Someone else updates and commits in between.
//! let mut t2 = svc.begin(TxMode::None);
//! svc.update_record(&mut t2, id, fields([("title", "B")])).unwrap();
//! svc.commit(&mut t2).unwrap();
//!
//! assert!(matches!(svc.commit(&mut t1), Err(Error::OptimisticConflict { .. })));
//! ```
//!
//! ## Lock modes
//!
//! | `TxMode` | Read | Commit |
//! |----------|------|--------|
//! | `None` | snapshot | validate reads, apply writes |
//! | `Optimistic` | snapshot | validate reads, apply writes |
//! | `OptimisticForceIncrement` | snapshot | validate reads, bump every read record |
//! | `PessimisticRead` | shared lock + snapshot | apply writes, release |
//! | `PessimisticWrite` | exclusive lock + snapshot | apply writes, release |

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod config;
pub mod storage;
pub mod lock;
pub mod tx;
pub mod service;
pub mod entity;
pub mod repository;

use std::time::Duration;

// ============================================================================
// Re-exports: Model (the DTOs)
// ============================================================================

pub use model::{Record, RecordId, Version, Value, FieldMap};

// ============================================================================
// Re-exports: Storage, locking, transactions
// ============================================================================

pub use config::EngineConfig;
pub use storage::{RecordStore, StoreConfig, MemoryStore};
pub use lock::{LockManager, LockMode, LockInfo};
pub use tx::{Transaction, TransactionManager, TxId, TxMode, TxOptions, TxState, WriteOp};

// ============================================================================
// Re-exports: Facades
// ============================================================================

pub use service::{RecordService, ArticleService};
pub use entity::{Entity, Article};
pub use repository::Repository;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Not found: record {0}")]
    NotFound(RecordId),

    #[error("Optimistic lock conflict on record {id}: expected {expected}, found {}", .actual.map_or_else(|| "deleted".to_string(), |v| v.to_string()))]
    OptimisticConflict {
        id: RecordId,
        expected: Version,
        /// `None` if the record no longer exists.
        actual: Option<Version>,
    },

    #[error("Timed out after {waited:?} waiting for {mode} lock on record {id}")]
    LockTimeout { id: RecordId, mode: LockMode, waited: Duration },

    #[error("Transaction {tx} is {state}")]
    TxClosed { tx: TxId, state: TxState },

    #[error("Transaction {0} is read-only")]
    ReadOnly(TxId),

    #[error("Record {0} already exists")]
    AlreadyExists(RecordId),

    #[error("Mapping error: {0}")]
    Mapping(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether retrying in a fresh transaction can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::OptimisticConflict { .. } | Error::LockTimeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
