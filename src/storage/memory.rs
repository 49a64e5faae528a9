//! In-memory storage backend

use crate::plugins::ExtractedArticle;
use crate::processing::{article_fingerprint, ArticleAnalysis};
use crate::storage::article_id;
use crate::storage::traits::{ArticleStore, SearchIndex, SourceStore, StorageError, StorageResult};
use crate::storage::{ArticleStatus, IndexDocument, Source, StoredArticle};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashMap;

/// Storage kept in concurrent maps for the lifetime of the process
#[derive(Debug, Default)]
pub struct MemoryStore {
    sources: DashMap<String, Source>,
    articles: DashMap<String, StoredArticle>,
    documents: DashMap<String, IndexDocument>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SourceStore for MemoryStore {
    fn upsert_source(&self, source: &Source) -> StorageResult<()> {
        self.sources
            .entry(source.id.clone())
            .and_modify(|existing| {
                let last_crawl_at = existing.last_crawl_at;
                *existing = source.clone();
                existing.last_crawl_at = last_crawl_at;
            })
            .or_insert_with(|| source.clone());
        Ok(())
    }

    fn get_source(&self, id: &str) -> StorageResult<Option<Source>> {
        Ok(self.sources.get(id).map(|s| s.value().clone()))
    }

    fn list_sources(&self) -> StorageResult<Vec<Source>> {
        let mut sources: Vec<Source> = self.sources.iter().map(|s| s.value().clone()).collect();
        sources.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(sources)
    }

    fn set_active(&self, id: &str, active: bool) -> StorageResult<()> {
        let mut source = self
            .sources
            .get_mut(id)
            .ok_or_else(|| StorageError::SourceNotFound(id.to_string()))?;
        source.active = active;
        Ok(())
    }

    fn record_crawl(&self, id: &str, at: DateTime<Utc>) -> StorageResult<()> {
        let mut source = self
            .sources
            .get_mut(id)
            .ok_or_else(|| StorageError::SourceNotFound(id.to_string()))?;
        source.last_crawl_at = Some(at);
        Ok(())
    }
}

impl ArticleStore for MemoryStore {
    fn upsert_article(&self, article: &ExtractedArticle) -> StorageResult<String> {
        let id = article_id(&article.url);
        let fingerprint = article_fingerprint(article);
        let now = Utc::now();

        self.articles
            .entry(id.clone())
            .and_modify(|existing| {
                existing.article = article.clone();
                existing.fingerprint = fingerprint.clone();
                existing.updated_at = now;
            })
            .or_insert_with(|| StoredArticle {
                id: id.clone(),
                article: article.clone(),
                status: ArticleStatus::Pending,
                fingerprint: fingerprint.clone(),
                analysis: None,
                created_at: now,
                updated_at: now,
            });

        Ok(id)
    }

    fn get_article(&self, id: &str) -> StorageResult<Option<StoredArticle>> {
        Ok(self.articles.get(id).map(|a| a.value().clone()))
    }

    fn list_by_status(
        &self,
        status: ArticleStatus,
        limit: usize,
    ) -> StorageResult<Vec<StoredArticle>> {
        let mut matching: Vec<StoredArticle> = self
            .articles
            .iter()
            .filter(|a| a.status == status)
            .map(|a| a.value().clone())
            .collect();
        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        matching.truncate(limit);
        Ok(matching)
    }

    fn save_analysis(
        &self,
        id: &str,
        analysis: &ArticleAnalysis,
        status: ArticleStatus,
    ) -> StorageResult<()> {
        let mut stored = self
            .articles
            .get_mut(id)
            .ok_or_else(|| StorageError::ArticleNotFound(id.to_string()))?;
        stored.analysis = Some(analysis.clone());
        stored.status = status;
        stored.updated_at = Utc::now();
        Ok(())
    }

    fn set_status(&self, id: &str, status: ArticleStatus) -> StorageResult<()> {
        let mut stored = self
            .articles
            .get_mut(id)
            .ok_or_else(|| StorageError::ArticleNotFound(id.to_string()))?;
        stored.status = status;
        stored.updated_at = Utc::now();
        Ok(())
    }

    fn find_by_fingerprint(&self, fingerprint: &str) -> StorageResult<Vec<String>> {
        let mut ids: Vec<String> = self
            .articles
            .iter()
            .filter(|a| a.fingerprint == fingerprint)
            .map(|a| a.id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    fn count_by_status(&self) -> StorageResult<HashMap<ArticleStatus, u64>> {
        let mut counts = HashMap::new();
        for article in self.articles.iter() {
            *counts.entry(article.status).or_insert(0) += 1;
        }
        Ok(counts)
    }
}

impl SearchIndex for MemoryStore {
    fn index_document(&self, document: &IndexDocument) -> StorageResult<()> {
        self.documents.insert(document.id.clone(), document.clone());
        Ok(())
    }

    fn get_document(&self, id: &str) -> StorageResult<Option<IndexDocument>> {
        Ok(self.documents.get(id).map(|d| d.value().clone()))
    }

    fn remove_document(&self, id: &str) -> StorageResult<bool> {
        Ok(self.documents.remove(id).is_some())
    }

    fn document_ids(&self) -> StorageResult<Vec<String>> {
        let mut ids: Vec<String> = self.documents.iter().map(|d| d.key().clone()).collect();
        ids.sort();
        Ok(ids)
    }

    fn clear_index(&self) -> StorageResult<u64> {
        let removed = self.documents.len() as u64;
        self.documents.clear();
        Ok(removed)
    }

    fn document_count(&self) -> StorageResult<u64> {
        Ok(self.documents.len() as u64)
    }
}
