//! Crawler module for source crawling
//!
//! This module contains the crawl engine:
//! - HTTP fetch sessions with retry, backoff and throttling
//! - HTML parsing and link extraction
//! - The crawl session state machine and its orchestrator

mod fetcher;
mod orchestrator;
mod parser;
mod state;

pub use fetcher::{FetchAttempt, FetchFailure, FetchSession, FetchStats, FetchStatsSnapshot, FetchedPage};
pub use orchestrator::{CrawlError, CrawlOrchestrator, CrawlResult};
pub use parser::{extract_links, extract_title, is_valid_link, parse_document, resolve_link, Page};
pub use state::CrawlState;

use crate::config::CrawlerConfig;
use crate::plugins::PluginRegistry;
use crate::storage::Source;
use crate::Result;

/// Crawls one source with the plugin it names
///
/// This is the main entry point for crawling. It will:
/// 1. Instantiate the source's plugin from the registry
/// 2. Open a fetch session from the crawler settings
/// 3. Run the orchestrator until it finishes
///
/// # Arguments
///
/// * `source` - The source to crawl
/// * `plugins` - Registry used to instantiate the source's plugin
/// * `config` - Crawler settings
/// * `max_pages` - Page limit overriding `config.max_pages`
///
/// # Returns
///
/// * `Ok(CrawlResult)` - The crawl ran; its own failures are inside the result
/// * `Err(NewsError)` - The plugin or the HTTP client could not be set up
pub async fn crawl_source(
    source: &Source,
    plugins: &PluginRegistry,
    config: &CrawlerConfig,
    max_pages: Option<u32>,
) -> Result<CrawlResult> {
    let plugin = plugins.create(source)?;
    let session = FetchSession::new(config)?;
    let max_pages = max_pages.unwrap_or(config.max_pages);

    Ok(CrawlOrchestrator::new(source.clone(), plugin, session, max_pages)
        .run()
        .await)
}
