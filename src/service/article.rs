//! Article service: the entity-level facade.

use crate::entity::Article;
use crate::model::RecordId;
use crate::repository::Repository;
use crate::storage::{MemoryStore, RecordStore};
use crate::tx::TxMode;
use crate::Result;
use super::RecordService;

pub struct ArticleService<S: RecordStore> {
    articles: Repository<Article, S>,
}

impl ArticleService<MemoryStore> {
    pub fn open_memory() -> Self {
        Self::new(RecordService::open_memory())
    }
}

impl<S: RecordStore> ArticleService<S> {
    pub fn new(service: RecordService<S>) -> Self {
        Self { articles: Repository::new(service) }
    }

    pub fn repository(&self) -> &Repository<Article, S> {
        &self.articles
    }

    /// Persist a new article and return its id.
    pub fn save_article(&self, article: &Article) -> Result<RecordId> {
        let saved = self.articles.save(article)?;
        saved.id.ok_or_else(|| crate::Error::Mapping("saved article has no id".into()))
    }

    /// Load an article under an optimistic lock.
    ///
    /// The read's version is re-checked when the transaction commits.
    pub fn get_article(&self, id: RecordId) -> Result<Option<Article>> {
        let article = self.articles.find_by_id_with_lock(id, TxMode::Optimistic)?;
        if let Some(a) = &article {
            tracing::info!(article = %a, "loaded");
        }
        Ok(article)
    }

    /// Same as [`get_article`](Self::get_article) in a read-only transaction.
    /// The commit-time version check still runs.
    pub fn get_article_read_only(&self, id: RecordId) -> Result<Option<Article>> {
        let article = self.articles.find_by_id_read_only(id, TxMode::Optimistic)?;
        if let Some(a) = &article {
            tracing::info!(article = %a, read_only = true, "loaded");
        }
        Ok(article)
    }
}
