//! # Record Lock Manager
//!
//! Shared/exclusive locks on individual records, held for the lifetime of a
//! pessimistic transaction (or for the duration of a commit's write phase).
//!
//! ## Compatibility
//!
//! | held \ requested | Shared | Exclusive |
//! |------------------|--------|-----------|
//! | none             | grant  | grant     |
//! | Shared (other)   | grant  | wait      |
//! | Exclusive (other)| wait   | wait      |
//!
//! A transaction that is the sole shared holder of a record may upgrade to
//! exclusive in place. Locks already held by the requester are never a
//! conflict.
//!
//! ## Limitations
//!
//! - **No deadlock detection.** Two shared holders that both try to upgrade,
//!   or a lock cycle across records, wait until the configured lock timeout
//!   fires (or forever if none is configured).
//! - **No fairness.** Every release wakes all waiters and the first one to
//!   re-take the table mutex wins.

use std::time::{Duration, Instant};

use hashbrown::HashMap;
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::model::RecordId;
use crate::tx::TxId;
use crate::{Error, Result};

// ============================================================================
// Lock modes
// ============================================================================

/// Lock strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LockMode {
    /// `SELECT ... FOR SHARE`: many readers, no writer.
    Shared,
    /// `SELECT ... FOR UPDATE`: a single holder.
    Exclusive,
}

impl LockMode {
    /// Whether a lock in `self` held by one transaction lets another
    /// transaction take `other`.
    pub fn is_compatible_with(self, other: LockMode) -> bool {
        matches!((self, other), (LockMode::Shared, LockMode::Shared))
    }
}

impl std::fmt::Display for LockMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockMode::Shared => write!(f, "shared"),
            LockMode::Exclusive => write!(f, "exclusive"),
        }
    }
}

/// One holder of a record lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    pub holder: TxId,
    pub mode: LockMode,
}

/// Holders of a single record's lock.
#[derive(Debug, Default)]
struct LockEntry {
    shared: SmallVec<[TxId; 4]>,
    exclusive: Option<TxId>,
}

impl LockEntry {
    fn is_free(&self) -> bool {
        self.shared.is_empty() && self.exclusive.is_none()
    }

    /// Grant `mode` to `tx` if compatible; otherwise return a blocking holder.
    fn try_grant(&mut self, tx: TxId, mode: LockMode) -> std::result::Result<(), TxId> {
        if let Some(owner) = self.exclusive {
            return if owner == tx { Ok(()) } else { Err(owner) };
        }
        match mode {
            LockMode::Shared => {
                if !self.shared.contains(&tx) {
                    self.shared.push(tx);
                }
                Ok(())
            }
            LockMode::Exclusive => {
                if let Some(other) = self.shared.iter().copied().find(|h| *h != tx) {
                    return Err(other);
                }
                self.shared.clear();
                self.exclusive = Some(tx);
                Ok(())
            }
        }
    }

    fn release(&mut self, tx: TxId) -> bool {
        let mut released = false;
        if self.exclusive == Some(tx) {
            self.exclusive = None;
            released = true;
        }
        let before = self.shared.len();
        self.shared.retain(|h| *h != tx);
        released || self.shared.len() != before
    }

    fn mode_of(&self, tx: TxId) -> Option<LockMode> {
        if self.exclusive == Some(tx) {
            Some(LockMode::Exclusive)
        } else if self.shared.contains(&tx) {
            Some(LockMode::Shared)
        } else {
            None
        }
    }
}

// ============================================================================
// LockManager
// ============================================================================

/// Blocking record lock table.
///
/// One mutex guards the whole table; waiters park on a single condvar that
/// is notified whenever any lock is released.
pub struct LockManager {
    table: Mutex<HashMap<RecordId, LockEntry>>,
    released: Condvar,
}

impl LockManager {
    pub fn new() -> Self {
        Self {
            table: Mutex::new(HashMap::new()),
            released: Condvar::new(),
        }
    }

    /// Block until `tx` holds a shared lock on `id`.
    pub fn acquire_shared(&self, tx: TxId, id: RecordId, timeout: Option<Duration>) -> Result<()> {
        self.acquire(tx, id, LockMode::Shared, timeout)
    }

    /// Block until `tx` holds an exclusive lock on `id`.
    pub fn acquire_exclusive(&self, tx: TxId, id: RecordId, timeout: Option<Duration>) -> Result<()> {
        self.acquire(tx, id, LockMode::Exclusive, timeout)
    }

    /// Block until `tx` holds `mode` on `id`, or `timeout` elapses.
    ///
    /// `timeout = None` waits forever.
    pub fn acquire(
        &self,
        tx: TxId,
        id: RecordId,
        mode: LockMode,
        timeout: Option<Duration>,
    ) -> Result<()> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut table = self.table.lock();

        loop {
            let blocker = match table.entry(id).or_default().try_grant(tx, mode) {
                Ok(()) => {
                    tracing::debug!(tx = %tx, record = %id, %mode, "lock granted");
                    return Ok(());
                }
                Err(holder) => holder,
            };
            tracing::debug!(tx = %tx, record = %id, %mode, blocker = %blocker, "waiting for lock");

            match deadline {
                None => self.released.wait(&mut table),
                Some(deadline) => {
                    if self.released.wait_until(&mut table, deadline).timed_out() {
                        if table.entry(id).or_default().try_grant(tx, mode).is_ok() {
                            return Ok(());
                        }
                        let waited = timeout.unwrap_or_default();
                        // The speculative entry() above may have created an empty slot.
                        if table.get(&id).is_some_and(LockEntry::is_free) {
                            table.remove(&id);
                        }
                        tracing::warn!(tx = %tx, record = %id, %mode, ?waited, "lock wait timed out");
                        return Err(Error::LockTimeout { id, mode, waited });
                    }
                }
            }
        }
    }

    /// Grant `mode` only if it is immediately available.
    ///
    /// Returns `false` if another transaction holds a conflicting lock.
    pub fn try_acquire(&self, tx: TxId, id: RecordId, mode: LockMode) -> bool {
        let mut table = self.table.lock();
        let granted = table.entry(id).or_default().try_grant(tx, mode).is_ok();
        if !granted && table.get(&id).is_some_and(LockEntry::is_free) {
            table.remove(&id);
        }
        granted
    }

    /// Release every lock `tx` holds and wake all waiters.
    ///
    /// Returns the number of records that were unlocked.
    pub fn release_all(&self, tx: TxId) -> usize {
        let mut table = self.table.lock();
        let mut count = 0;
        table.retain(|_, entry| {
            if entry.release(tx) {
                count += 1;
            }
            !entry.is_free()
        });
        drop(table);

        if count > 0 {
            tracing::debug!(tx = %tx, released = count, "locks released");
            self.released.notify_all();
        }
        count
    }

    /// Current holders of `id`'s lock.
    pub fn holders(&self, id: RecordId) -> Vec<LockInfo> {
        let table = self.table.lock();
        let Some(entry) = table.get(&id) else {
            return Vec::new();
        };
        let mut out: Vec<LockInfo> = entry
            .shared
            .iter()
            .map(|h| LockInfo { holder: *h, mode: LockMode::Shared })
            .collect();
        if let Some(h) = entry.exclusive {
            out.push(LockInfo { holder: h, mode: LockMode::Exclusive });
        }
        out
    }

    /// Every `(record, mode)` currently held by `tx`, ordered by record id.
    pub fn locks_held_by(&self, tx: TxId) -> Vec<(RecordId, LockMode)> {
        let table = self.table.lock();
        let mut held: Vec<_> = table
            .iter()
            .filter_map(|(id, entry)| entry.mode_of(tx).map(|m| (*id, m)))
            .collect();
        held.sort_by_key(|(id, _)| *id);
        held
    }

    pub fn is_locked(&self, id: RecordId) -> bool {
        self.table.lock().get(&id).is_some_and(|e| !e.is_free())
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================
