//! Transaction management.
//!
//! A [`Transaction`] is the per-caller state (read set, write set, lifecycle);
//! the [`TransactionManager`] owns the shared pieces (store, lock table,
//! commit mutex) and runs every operation against a transaction.

pub mod manager;
pub mod transaction;

use serde::{Deserialize, Serialize};

use crate::lock::LockMode;

pub use manager::TransactionManager;
pub use transaction::{Transaction, WriteOp};

/// Concurrency mode of a transaction.
///
/// Named after the JPA `LockModeType` each one reproduces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxMode {
    /// Plain versioned access. Reads are still validated at commit.
    None,
    /// Every record read is re-checked against its snapshot version at commit.
    Optimistic,
    /// Like `Optimistic`, and every record read is version-bumped on commit
    /// even if it was never written.
    OptimisticForceIncrement,
    /// Reads take a shared lock held until the transaction ends.
    PessimisticRead,
    /// Reads take an exclusive lock held until the transaction ends.
    PessimisticWrite,
}

impl TxMode {
    /// Lock taken by `read` in this mode, if any.
    pub fn read_lock(self) -> Option<LockMode> {
        match self {
            TxMode::PessimisticRead => Some(LockMode::Shared),
            TxMode::PessimisticWrite => Some(LockMode::Exclusive),
            _ => None,
        }
    }

    pub fn is_pessimistic(self) -> bool {
        self.read_lock().is_some()
    }

    pub fn forces_increment(self) -> bool {
        self == TxMode::OptimisticForceIncrement
    }
}

/// Opaque transaction identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TxId(pub u64);

impl std::fmt::Display for TxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tx{}", self.0)
    }
}

/// Lifecycle state. `Committed` and `RolledBack` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxState {
    Active,
    Committed,
    RolledBack,
}

impl TxState {
    pub fn is_terminal(self) -> bool {
        self != TxState::Active
    }
}

impl std::fmt::Display for TxState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TxState::Active => write!(f, "active"),
            TxState::Committed => write!(f, "committed"),
            TxState::RolledBack => write!(f, "rolled back"),
        }
    }
}

/// Options for [`TransactionManager::begin_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxOptions {
    pub mode: TxMode,
    /// Reject every write with `Error::ReadOnly`.
    pub read_only: bool,
}

impl TxOptions {
    pub fn new(mode: TxMode) -> Self {
        Self { mode, read_only: false }
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }
}

impl From<TxMode> for TxOptions {
    fn from(mode: TxMode) -> Self {
        Self::new(mode)
    }
}
