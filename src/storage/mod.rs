//! Storage module for sources, articles and the search index
//!
//! This module defines the records the pipeline stages hand to each other
//! and the traits through which they are persisted:
//! - `SourceStore` for registered sources and their crawl history
//! - `ArticleStore` for extracted articles and their analysis
//! - `SearchIndex` for documents built by the index stage
//!
//! Two backends are provided: `MemoryStore` and `SqliteStorage`.

mod memory;
mod schema;
mod sqlite;
mod traits;

pub use memory::MemoryStore;
pub use sqlite::SqliteStorage;
pub use traits::{ArticleStore, SearchIndex, SourceStore, StorageError, StorageResult, Store};

use crate::config::StorageConfig;
use crate::normalize_url;
use crate::plugins::ExtractedArticle;
use crate::processing::{ArticleAnalysis, SentimentLabel};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Opens the store selected by the storage configuration
///
/// A configured database path opens (or creates) a SQLite database; without
/// one the store lives in memory for the lifetime of the process.
pub fn open_store(config: &StorageConfig) -> StorageResult<Arc<dyn Store>> {
    match &config.database_path {
        Some(path) => Ok(Arc::new(SqliteStorage::new(Path::new(path))?)),
        None => Ok(Arc::new(MemoryStore::new())),
    }
}

/// Derives the stable storage id of an article from its URL
///
/// The id is the hex encoding of the first 16 bytes of the SHA-256 of the
/// normalized URL, so re-crawling the same article overwrites its record.
pub fn article_id(url: &str) -> String {
    let canonical = normalize_url(url)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| url.trim().to_string());
    let digest = Sha256::digest(canonical.as_bytes());
    hex::encode(&digest[..16])
}

/// Kind of content source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Website,
    Rss,
    Api,
    SocialMedia,
}

impl SourceKind {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Website => "website",
            Self::Rss => "rss",
            Self::Api => "api",
            Self::SocialMedia => "social_media",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "website" => Some(Self::Website),
            "rss" => Some(Self::Rss),
            "api" => Some(Self::Api),
            "social_media" => Some(Self::SocialMedia),
            _ => None,
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// A registered content source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    pub name: String,
    pub url: String,
    pub kind: SourceKind,
    pub plugin: String,
    pub active: bool,
    pub crawl_interval_secs: u64,
    pub last_crawl_at: Option<DateTime<Utc>>,
}

impl Source {
    /// Returns true if the source is active and its crawl interval has elapsed
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        if !self.active {
            return false;
        }
        match self.last_crawl_at {
            None => true,
            Some(last) => {
                let elapsed = now.signed_duration_since(last).num_seconds();
                elapsed >= self.crawl_interval_secs as i64
            }
        }
    }
}

/// Lifecycle of a stored article through the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArticleStatus {
    /// Stored by a crawl, not yet analyzed
    Pending,
    /// Analyzed and waiting for indexing
    Processed,
    /// Analyzed and found to repeat an earlier article
    Duplicate,
    /// Present in the search index
    Indexed,
}

impl ArticleStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processed => "processed",
            Self::Duplicate => "duplicate",
            Self::Indexed => "indexed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processed" => Some(Self::Processed),
            "duplicate" => Some(Self::Duplicate),
            "indexed" => Some(Self::Indexed),
            _ => None,
        }
    }

    /// Returns true once an analysis has been saved for the article
    pub fn is_analyzed(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for ArticleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// An extracted article as persisted by the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredArticle {
    pub id: String,
    pub article: ExtractedArticle,
    pub status: ArticleStatus,
    /// Content fingerprint, refreshed on every upsert
    pub fingerprint: String,
    pub analysis: Option<ArticleAnalysis>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A document held by the search index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDocument {
    pub id: String,
    pub title: String,
    pub content: String,
    pub url: String,
    pub source_id: String,
    pub source_name: String,
    pub category: String,
    pub keywords: Vec<String>,
    pub sentiment_score: f64,
    pub sentiment_label: SentimentLabel,
    pub publish_time: Option<String>,
    pub indexed_at: DateTime<Utc>,
}

impl IndexDocument {
    /// Builds the index document for an analyzed article
    ///
    /// Returns `None` when the article carries no analysis.
    pub fn from_article(stored: &StoredArticle, indexed_at: DateTime<Utc>) -> Option<Self> {
        let analysis = stored.analysis.as_ref()?;
        Some(Self {
            id: stored.id.clone(),
            title: stored.article.title.clone(),
            content: analysis.cleaned_content.clone(),
            url: stored.article.url.clone(),
            source_id: stored.article.source_id.clone(),
            source_name: stored.article.source_name.clone(),
            category: analysis.category.clone(),
            keywords: analysis.keywords.clone(),
            sentiment_score: analysis.sentiment_score,
            sentiment_label: analysis.sentiment_label,
            publish_time: stored.article.publish_time.clone(),
            indexed_at,
        })
    }
}
