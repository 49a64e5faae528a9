//! Source extraction plugins
//!
//! Every content source is crawled through a `SourcePlugin`, which turns a
//! fetched page into articles and decides where the next page is. Plugins
//! are created by name through the `PluginRegistry`:
//! - `rss` / `feed`: syndication feeds (`FeedPlugin`)
//! - `sina`: Sina-style news list pages (`SelectorPlugin`)
//! - `generic`: list pages of any site (`SelectorPlugin`)

mod feed;
mod pagination;
mod site;
mod text;

pub use feed::{discover_feed_urls, FeedPlugin};
pub use pagination::{find_next_page, infer_next_page, is_valid_next_page, ContentArea};
pub use site::{SelectorPlugin, SiteProfile, GENERIC_PROFILE, SINA_PROFILE};
pub use text::{clean_text, html_to_text};

use crate::crawler::{FetchSession, Page};
use crate::storage::Source;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use url::Url;

/// An article extracted from a source
///
/// Title and URL are always non-empty; extraction discards anything else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedArticle {
    pub title: String,
    pub content: String,
    pub url: String,
    pub author: Option<String>,
    /// Publish time exactly as the source printed it
    pub publish_time: Option<String>,
    pub category: Option<String>,
    pub source_id: String,
    pub source_name: String,
    pub extracted_at: DateTime<Utc>,
}

impl ExtractedArticle {
    pub fn is_valid(&self) -> bool {
        !self.title.trim().is_empty() && !self.url.trim().is_empty()
    }
}

/// Errors raised by extraction plugins
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("Unknown plugin: {0}")]
    UnknownPlugin(String),

    #[error("Invalid source '{source_id}': {reason}")]
    InvalidSource { source_id: String, reason: String },

    #[error("Invalid selector: {0}")]
    Selector(String),

    #[error("Failed to fetch {url}: {error}")]
    Fetch { url: String, error: String },

    #[error("Failed to parse feed {url}: {reason}")]
    Feed { url: String, reason: String },
}

/// Per-source extraction behavior
///
/// Implementations must be shareable across tasks; a plugin instance is
/// created per crawl and used for every page of it.
#[async_trait]
pub trait SourcePlugin: Send + Sync {
    /// Registry name of the plugin
    fn name(&self) -> &str;

    /// Extracts the articles on a page
    ///
    /// # Arguments
    ///
    /// * `page` - The fetched page
    /// * `session` - The crawl's fetch session, for plugins that need extra requests
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<ExtractedArticle>)` - Articles found, possibly none
    /// * `Err(PluginError)` - The page could not be processed at all
    async fn extract_articles(
        &self,
        page: &Page,
        session: &FetchSession,
    ) -> Result<Vec<ExtractedArticle>, PluginError>;

    /// Returns the URL of the page following `page`, if any
    fn next_page_url(&self, page: &Page) -> Option<Url>;
}

/// Builds a plugin instance for a source
pub type PluginConstructor = fn(&Source) -> Result<Arc<dyn SourcePlugin>, PluginError>;

/// Maps plugin names to constructors
#[derive(Clone, Default)]
pub struct PluginRegistry {
    constructors: HashMap<String, PluginConstructor>,
}

impl PluginRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the built-in plugins
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("rss", feed_plugin);
        registry.register("feed", feed_plugin);
        registry.register("sina", sina_plugin);
        registry.register("generic", generic_plugin);
        registry
    }

    /// Registers (or replaces) a constructor under `name`
    pub fn register(&mut self, name: &str, constructor: PluginConstructor) {
        self.constructors.insert(name.to_string(), constructor);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    /// Registered plugin names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Instantiates the plugin named by `source.plugin`
    pub fn create(&self, source: &Source) -> Result<Arc<dyn SourcePlugin>, PluginError> {
        let constructor = self
            .constructors
            .get(&source.plugin)
            .ok_or_else(|| PluginError::UnknownPlugin(source.plugin.clone()))?;
        constructor(source)
    }
}

fn feed_plugin(source: &Source) -> Result<Arc<dyn SourcePlugin>, PluginError> {
    Ok(Arc::new(FeedPlugin::new(source)?))
}

fn sina_plugin(source: &Source) -> Result<Arc<dyn SourcePlugin>, PluginError> {
    Ok(Arc::new(SelectorPlugin::sina(source)?))
}

fn generic_plugin(source: &Source) -> Result<Arc<dyn SourcePlugin>, PluginError> {
    Ok(Arc::new(SelectorPlugin::generic(source)?))
}
