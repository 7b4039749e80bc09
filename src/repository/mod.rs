//! # Entity Repository
//!
//! Typed CRUD over a [`RecordService`]. One repository per entity type; the
//! underlying store is assumed to hold only that entity's records.
//!
//! Methods come in two flavours:
//! - `*_in(tx, ..)` run inside the caller's transaction;
//! - the rest open, commit and close their own transaction.

use std::marker::PhantomData;

use crate::entity::Entity;
use crate::model::RecordId;
use crate::service::RecordService;
use crate::storage::{conflict, RecordStore};
use crate::tx::{Transaction, TxMode};
use crate::{Error, Result};

pub struct Repository<E: Entity, S: RecordStore> {
    service: RecordService<S>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity, S: RecordStore> Clone for Repository<E, S> {
    fn clone(&self) -> Self {
        Self::new(self.service.clone())
    }
}

impl<E: Entity, S: RecordStore> Repository<E, S> {
    pub fn new(service: RecordService<S>) -> Self {
        Self { service, _entity: PhantomData }
    }

    pub fn service(&self) -> &RecordService<S> {
        &self.service
    }

    // ========================================================================
    // Inside a caller's transaction
    // ========================================================================

    /// Insert (no id) or update (id + version) inside `tx`.
    ///
    /// Returns the entity as it will be after commit. An update whose
    /// version is behind the stored one fails with `OptimisticConflict`.
    pub fn save_in(&self, tx: &mut Transaction, entity: &E) -> Result<E> {
        let m = self.service.manager();
        let Some(id) = entity.id() else {
            let id = m.create(tx, entity.to_fields())?;
            return E::from_record(&m.read(tx, id)?);
        };
        let expected = entity
            .version()
            .ok_or_else(|| Error::Mapping(format!("entity {id} has an id but no version")))?;

        let current = m.read(tx, id)?;
        if current.version != expected {
            let err = conflict(id, expected, Some(current.version));
            m.rollback(tx);
            return Err(err);
        }
        E::from_record(&m.write(tx, id, entity.to_fields())?)
    }

    /// Look up by id inside `tx`, using `tx`'s lock mode.
    pub fn find_by_id_in(&self, tx: &mut Transaction, id: RecordId) -> Result<Option<E>> {
        match self.service.manager().read(tx, id) {
            Ok(record) => E::from_record(&record).map(Some),
            Err(Error::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn delete_in(&self, tx: &mut Transaction, id: RecordId) -> Result<()> {
        self.service.manager().delete(tx, id)
    }

    // ========================================================================
    // Transaction-per-call
    // ========================================================================

    /// Save in a fresh `None`-mode transaction and return the committed entity.
    pub fn save(&self, entity: &E) -> Result<E> {
        self.service.in_transaction(TxMode::None, |_, tx| self.save_in(tx, entity))
    }

    pub fn find_by_id(&self, id: RecordId) -> Result<Option<E>> {
        self.find_by_id_with_lock(id, TxMode::None)
    }

    /// Look up by id in a fresh transaction of the given mode.
    ///
    /// Under `TxMode::Optimistic` the commit re-checks the version, so the
    /// call fails if the record changes between the read and the commit.
    pub fn find_by_id_with_lock(&self, id: RecordId, mode: TxMode) -> Result<Option<E>> {
        self.service.in_transaction(mode, |_, tx| self.find_by_id_in(tx, id))
    }

    /// Read-only variant of [`find_by_id_with_lock`](Self::find_by_id_with_lock).
    pub fn find_by_id_read_only(&self, id: RecordId, mode: TxMode) -> Result<Option<E>> {
        let options = crate::tx::TxOptions::new(mode).read_only();
        self.service.in_transaction(options, |_, tx| self.find_by_id_in(tx, id))
    }

    /// Every entity, ordered by id.
    pub fn find_all(&self) -> Result<Vec<E>> {
        self.service.in_transaction(TxMode::None, |m, tx| {
            let ids = m.store().ids();
            let mut out = Vec::with_capacity(ids.len());
            for id in ids {
                match m.read(tx, id) {
                    Ok(record) => out.push(E::from_record(&record)?),
                    // Deleted between listing and reading.
                    Err(Error::NotFound(_)) => {}
                    Err(e) => return Err(e),
                }
            }
            Ok(out)
        })
    }

    /// Delete every record in one transaction. Returns how many were removed.
    pub fn delete_all(&self) -> Result<usize> {
        let removed = self.service.in_transaction(TxMode::None, |m, tx| {
            let mut removed = 0;
            for id in m.store().ids() {
                match m.delete(tx, id) {
                    Ok(()) => removed += 1,
                    Err(Error::NotFound(_)) => {}
                    Err(e) => return Err(e),
                }
            }
            Ok(removed)
        })?;
        tracing::debug!(removed, "deleted all");
        Ok(removed)
    }

    pub fn count(&self) -> usize {
        self.service.store().len()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Article;
    use crate::model::Version;
    use crate::storage::MemoryStore;

    fn repo() -> Repository<Article, MemoryStore> {
        Repository::new(RecordService::open_memory())
    }

    #[test]
    fn test_save_assigns_id_and_version_zero() {
        let repo = repo();
        let saved = repo.save(&Article::new("A")).unwrap();
        assert!(saved.id.is_some());
        assert_eq!(saved.version, Some(Version(0)));
        assert_eq!(repo.count(), 1);
    }

    #[test]
    fn test_save_existing_bumps_version() {
        let repo = repo();
        let saved = repo.save(&Article::new("A")).unwrap();
        let updated = repo.save(&saved.clone().with_title("B")).unwrap();
        assert_eq!(updated.version, Some(Version(1)));

        let found = repo.find_by_id(saved.id.unwrap()).unwrap().unwrap();
        assert_eq!(found, updated);
    }

    #[test]
    fn test_save_stale_entity_conflicts() {
        let repo = repo();
        let v0 = repo.save(&Article::new("A")).unwrap();
        repo.save(&v0.clone().with_title("B")).unwrap();

        let err = repo.save(&v0.with_title("C")).unwrap_err();
        assert!(matches!(err, Error::OptimisticConflict { expected: Version(0), .. }));
    }

    #[test]
    fn test_find_missing_is_none() {
        let repo = repo();
        assert_eq!(repo.find_by_id(RecordId(9)).unwrap(), None);
        assert_eq!(repo.find_by_id_with_lock(RecordId(9), TxMode::Optimistic).unwrap(), None);
    }

    #[test]
    fn test_delete_all_and_find_all() {
        let repo = repo();
        for t in ["A", "B", "C"] {
            repo.save(&Article::new(t)).unwrap();
        }
        let titles: Vec<String> = repo.find_all().unwrap().into_iter().map(|a| a.title).collect();
        assert_eq!(titles, vec!["A", "B", "C"]);

        assert_eq!(repo.delete_all().unwrap(), 3);
        assert_eq!(repo.count(), 0);
    }

    #[test]
    fn test_save_with_id_but_no_version_is_mapping_error() {
        let repo = repo();
        let saved = repo.save(&Article::new("A")).unwrap();
        let broken = Article { version: None, ..saved };
        assert!(matches!(repo.save(&broken), Err(Error::Mapping(_))));
    }
}
