//! End-to-end tests for the entity layer: `ArticleService` and `Repository`.

use std::thread;

use optlock::{Article, ArticleService, Error, RecordId, RecordStore, TxMode, TxOptions, Version};
use pretty_assertions::assert_eq;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn seeded(title: &str) -> (ArticleService<optlock::MemoryStore>, RecordId) {
    init_tracing();
    let svc = ArticleService::open_memory();
    let id = svc.save_article(&Article::new(title)).unwrap();
    (svc, id)
}

// ============================================================================
// 1. Save and load
// ============================================================================

#[test]
fn test_saved_article_starts_at_version_zero() {
    let (svc, id) = seeded("A");

    let article = svc.get_article(id).unwrap().unwrap();
    assert_eq!(
        article,
        Article { id: Some(id), title: "A".into(), version: Some(Version(0)) }
    );
    assert_eq!(article.to_string(), format!("Article(id={id}, title=A, version=0)"));
}

#[test]
fn test_get_article_read_only_matches_read_write() {
    let (svc, id) = seeded("A");
    assert_eq!(svc.get_article_read_only(id).unwrap(), svc.get_article(id).unwrap());
}

#[test]
fn test_missing_article_is_none() {
    let (svc, _) = seeded("A");
    assert_eq!(svc.get_article(RecordId(404)).unwrap(), None);
    assert_eq!(svc.get_article_read_only(RecordId(404)).unwrap(), None);
}

// ============================================================================
// 2. Optimistic read inside a longer transaction loses to a concurrent update
// ============================================================================

#[test]
fn test_optimistic_lookup_conflicts_with_concurrent_update() {
    let (svc, id) = seeded("A");
    let repo = svc.repository();
    let records = repo.service();

    let mut t1 = records.begin(TxMode::Optimistic);
    let seen = repo.find_by_id_in(&mut t1, id).unwrap().unwrap();
    assert_eq!(seen.version, Some(Version(0)));

    thread::scope(|s| {
        s.spawn(|| {
            let current = repo.find_by_id(id).unwrap().unwrap();
            let updated = repo.save(&current.with_title("B")).unwrap();
            assert_eq!(updated.version, Some(Version(1)));
        });
    });

    let err = records.commit(&mut t1).unwrap_err();
    assert!(matches!(
        err,
        Error::OptimisticConflict { expected: Version(0), actual: Some(Version(1)), .. }
    ));
    assert!(err.is_retryable());

    let stored = repo.find_by_id(id).unwrap().unwrap();
    assert_eq!(stored.title, "B");
    assert_eq!(stored.version, Some(Version(1)));
}

#[test]
fn test_read_only_lookup_still_validates() {
    let (svc, id) = seeded("A");
    let repo = svc.repository();
    let records = repo.service();

    let mut t1 = records.begin_with(TxOptions::new(TxMode::Optimistic).read_only());
    repo.find_by_id_in(&mut t1, id).unwrap();

    let current = repo.find_by_id(id).unwrap().unwrap();
    repo.save(&current.with_title("B")).unwrap();

    assert!(matches!(records.commit(&mut t1), Err(Error::OptimisticConflict { .. })));
}

#[test]
fn test_read_only_transaction_rejects_save() {
    let (svc, id) = seeded("A");
    let repo = svc.repository();

    let mut tx = repo.service().begin_with(TxOptions::new(TxMode::None).read_only());
    let article = repo.find_by_id_in(&mut tx, id).unwrap().unwrap();
    let err = repo.save_in(&mut tx, &article.with_title("B")).unwrap_err();
    assert!(matches!(err, Error::ReadOnly(_)));
}

// ============================================================================
// 3. Detached entities: saving a stale copy fails
// ============================================================================

#[test]
fn test_stale_detached_entity_is_rejected() {
    let (svc, id) = seeded("A");
    let repo = svc.repository();

    let first = repo.find_by_id(id).unwrap().unwrap();
    let second = first.clone();

    repo.save(&first.with_title("from first")).unwrap();
    let err = repo.save(&second.with_title("from second")).unwrap_err();
    assert!(matches!(err, Error::OptimisticConflict { .. }));

    let stored = repo.find_by_id(id).unwrap().unwrap();
    assert_eq!(stored.title, "from first");
    assert_eq!(stored.version, Some(Version(1)));
}

// ============================================================================
// 4. Transaction-scoped repository work
// ============================================================================

#[test]
fn test_save_and_delete_in_one_transaction() {
    let (svc, id) = seeded("A");
    let repo = svc.repository();
    let records = repo.service();

    let mut tx = records.begin(TxMode::Optimistic);
    let created = repo.save_in(&mut tx, &Article::new("B")).unwrap();
    repo.delete_in(&mut tx, id).unwrap();
    // Nothing visible before commit.
    assert_eq!(repo.count(), 1);
    assert!(records.store().get(created.id.unwrap()).is_err());

    records.commit(&mut tx).unwrap();

    let titles: Vec<String> = repo.find_all().unwrap().into_iter().map(|a| a.title).collect();
    assert_eq!(titles, vec!["B".to_string()]);
    assert_eq!(repo.find_by_id(id).unwrap(), None);
}

#[test]
fn test_find_by_id_with_pessimistic_lock_releases_on_return() {
    let (svc, id) = seeded("A");
    let repo = svc.repository();

    let found = repo.find_by_id_with_lock(id, TxMode::PessimisticWrite).unwrap();
    assert!(found.is_some());
    assert!(!repo.service().manager().lock_manager().is_locked(id));
}

#[test]
fn test_delete_all_empties_store() {
    let (svc, _) = seeded("A");
    let repo = svc.repository();
    repo.save(&Article::new("B")).unwrap();
    repo.save(&Article::new("C")).unwrap();

    assert_eq!(repo.count(), 3);
    assert_eq!(repo.delete_all().unwrap(), 3);
    assert_eq!(repo.count(), 0);
    assert!(repo.find_all().unwrap().is_empty());
}
