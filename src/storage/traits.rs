//! Storage traits and error types
//!
//! Backends are shared between concurrently running task bodies, so every
//! operation takes `&self` and implementations synchronize internally.

use crate::plugins::ExtractedArticle;
use crate::processing::ArticleAnalysis;
use crate::storage::{ArticleStatus, IndexDocument, Source, StoredArticle};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Source not found: {0}")]
    SourceNotFound(String),

    #[error("Article not found: {0}")]
    ArticleNotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Registered sources and their crawl history
pub trait SourceStore: Send + Sync {
    /// Inserts a source or updates its registration fields
    ///
    /// An existing record keeps its `last_crawl_at`.
    fn upsert_source(&self, source: &Source) -> StorageResult<()>;

    fn get_source(&self, id: &str) -> StorageResult<Option<Source>>;

    /// Lists all sources ordered by id
    fn list_sources(&self) -> StorageResult<Vec<Source>>;

    /// Activates or deactivates a source
    fn set_active(&self, id: &str, active: bool) -> StorageResult<()>;

    /// Records the completion time of a crawl
    fn record_crawl(&self, id: &str, at: DateTime<Utc>) -> StorageResult<()>;
}

/// Extracted articles and their analysis
pub trait ArticleStore: Send + Sync {
    /// Stores an extracted article under its URL-derived id
    ///
    /// # Arguments
    ///
    /// * `article` - The article as produced by a source plugin
    ///
    /// # Returns
    ///
    /// The article id. Storing the same URL again replaces the extracted
    /// fields but keeps the status and analysis of the existing record.
    fn upsert_article(&self, article: &ExtractedArticle) -> StorageResult<String>;

    fn get_article(&self, id: &str) -> StorageResult<Option<StoredArticle>>;

    /// Lists up to `limit` articles in the given status, oldest first
    fn list_by_status(&self, status: ArticleStatus, limit: usize)
        -> StorageResult<Vec<StoredArticle>>;

    /// Saves (or overwrites) the analysis of an article and sets its status
    fn save_analysis(
        &self,
        id: &str,
        analysis: &ArticleAnalysis,
        status: ArticleStatus,
    ) -> StorageResult<()>;

    fn set_status(&self, id: &str, status: ArticleStatus) -> StorageResult<()>;

    /// Returns the ids of stored articles with the given fingerprint, sorted
    ///
    /// Every stored article takes part, analyzed or not.
    fn find_by_fingerprint(&self, fingerprint: &str) -> StorageResult<Vec<String>>;

    /// Counts articles per status
    fn count_by_status(&self) -> StorageResult<HashMap<ArticleStatus, u64>>;
}

/// Documents built by the index stage
pub trait SearchIndex: Send + Sync {
    /// Inserts or replaces a document
    fn index_document(&self, document: &IndexDocument) -> StorageResult<()>;

    fn get_document(&self, id: &str) -> StorageResult<Option<IndexDocument>>;

    /// Removes one document, returning whether it existed
    fn remove_document(&self, id: &str) -> StorageResult<bool>;

    /// Ids of every indexed document, sorted
    fn document_ids(&self) -> StorageResult<Vec<String>>;

    /// Removes every document, returning how many were removed
    fn clear_index(&self) -> StorageResult<u64>;

    fn document_count(&self) -> StorageResult<u64>;
}

/// A backend providing every storage concern the pipeline needs
pub trait Store: SourceStore + ArticleStore + SearchIndex {}

impl<T: SourceStore + ArticleStore + SearchIndex> Store for T {}
