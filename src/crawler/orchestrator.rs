//! Crawl session orchestration
//!
//! Drives the fetch → parse → extract → paginate loop for one source. The
//! loop is strictly sequential and never visits more than `max_pages` pages.

use crate::crawler::fetcher::{FetchFailure, FetchSession};
use crate::crawler::parser::Page;
use crate::crawler::state::CrawlState;
use crate::normalize_url;
use crate::plugins::{ExtractedArticle, SourcePlugin};
use crate::storage::Source;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;
use url::Url;

/// Error recorded during a crawl
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CrawlError {
    /// A page fetch that exhausted its retries
    Fetch {
        url: String,
        error: String,
        retries: u32,
    },
    /// A failure that stopped the session
    Session {
        #[serde(rename = "type")]
        kind: String,
        error: String,
        /// 1-based index of the page being processed, 0 before the first fetch
        page: u32,
    },
}

impl CrawlError {
    pub fn session(error: impl Into<String>, page: u32) -> Self {
        Self::Session {
            kind: "crawler_error".to_string(),
            error: error.into(),
            page,
        }
    }
}

impl From<FetchFailure> for CrawlError {
    fn from(failure: FetchFailure) -> Self {
        Self::Fetch {
            url: failure.url,
            error: failure.error,
            retries: failure.retries,
        }
    }
}

/// Outcome of one crawl session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlResult {
    pub source_id: String,
    pub source_url: String,
    /// Valid articles extracted, counting repeats
    pub articles_found: usize,
    /// Articles left after deduplication by normalized URL
    pub articles_processed: usize,
    pub pages_crawled: u32,
    /// Elapsed wall time in seconds
    pub crawl_time: f64,
    pub errors: Vec<CrawlError>,
    pub articles: Vec<ExtractedArticle>,
}

impl CrawlResult {
    fn new(source: &Source) -> Self {
        Self {
            source_id: source.id.clone(),
            source_url: source.url.clone(),
            articles_found: 0,
            articles_processed: 0,
            pages_crawled: 0,
            crawl_time: 0.0,
            errors: Vec::new(),
            articles: Vec::new(),
        }
    }
}

/// Runs one crawl session for a source
pub struct CrawlOrchestrator {
    source: Source,
    plugin: Arc<dyn SourcePlugin>,
    session: FetchSession,
    max_pages: u32,
    state: CrawlState,
}

impl CrawlOrchestrator {
    /// Creates an orchestrator
    ///
    /// # Arguments
    ///
    /// * `source` - The source to crawl, starting at its URL
    /// * `plugin` - Extraction plugin for the source
    /// * `session` - Fetch session owned by this crawl; closed when the run ends
    /// * `max_pages` - Upper bound on pages fetched successfully
    pub fn new(
        source: Source,
        plugin: Arc<dyn SourcePlugin>,
        session: FetchSession,
        max_pages: u32,
    ) -> Self {
        Self {
            source,
            plugin,
            session,
            max_pages: max_pages.max(1),
            state: CrawlState::Idle,
        }
    }

    pub fn state(&self) -> CrawlState {
        self.state
    }

    fn transition(&mut self, next: CrawlState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid crawl transition {} -> {}",
            self.state,
            next
        );
        tracing::trace!(from = %self.state, to = %next, "Crawl state change");
        self.state = next;
    }

    /// Runs the crawl to completion
    ///
    /// Never fails: fetch failures end the loop and are recorded as errors,
    /// plugin errors stop the session with a session error, and the partial
    /// result is returned either way.
    pub async fn run(self) -> CrawlResult {
        let span = tracing::info_span!("crawl", source_id = %self.source.id);
        self.run_session().instrument(span).await
    }

    async fn run_session(mut self) -> CrawlResult {
        let started = Instant::now();
        let mut result = CrawlResult::new(&self.source);
        let mut seen_articles: HashSet<String> = HashSet::new();
        let mut visited_pages: HashSet<Url> = HashSet::new();

        tracing::info!(
            url = %self.source.url,
            plugin = self.plugin.name(),
            max_pages = self.max_pages,
            "Starting crawl"
        );

        let mut next = match Url::parse(&self.source.url) {
            Ok(url) => Some(url),
            Err(e) => {
                result
                    .errors
                    .push(CrawlError::session(format!("Invalid source URL: {}", e), 0));
                self.transition(CrawlState::Failed);
                None
            }
        };

        while let Some(url) = next.take() {
            self.transition(CrawlState::Fetching);
            visited_pages.insert(url.clone());

            let attempt = self.session.fetch(&url).await;
            let fetched = match attempt.outcome {
                Ok(page) => page,
                Err(failure) => {
                    result.errors.push(failure.into());
                    self.transition(CrawlState::Done);
                    break;
                }
            };

            result.pages_crawled += 1;
            let page_index = result.pages_crawled;

            self.transition(CrawlState::Parsing);
            let page = Page::new(fetched.url, fetched.body);

            self.transition(CrawlState::Extracting);
            match self.plugin.extract_articles(&page, &self.session).await {
                Ok(articles) => {
                    let before = result.articles.len();
                    for article in articles.into_iter().filter(ExtractedArticle::is_valid) {
                        result.articles_found += 1;
                        let key = normalize_url(&article.url)
                            .map(|u| u.to_string())
                            .unwrap_or_else(|_| article.url.clone());
                        if seen_articles.insert(key) {
                            result.articles.push(article);
                        }
                    }
                    tracing::debug!(
                        page = page_index,
                        url = %page.url,
                        new_articles = result.articles.len() - before,
                        "Processed page"
                    );
                }
                Err(e) => {
                    tracing::warn!(page = page_index, url = %page.url, error = %e, "Extraction failed");
                    result
                        .errors
                        .push(CrawlError::session(e.to_string(), page_index));
                    self.transition(CrawlState::Failed);
                    break;
                }
            }

            self.transition(CrawlState::Paginating);
            if result.pages_crawled >= self.max_pages {
                tracing::debug!(max_pages = self.max_pages, "Page limit reached");
                self.transition(CrawlState::Done);
                break;
            }

            match self.plugin.next_page_url(&page) {
                Some(next_url) if !visited_pages.contains(&next_url) => next = Some(next_url),
                _ => self.transition(CrawlState::Done),
            }
        }

        result.articles_processed = result.articles.len();
        result.crawl_time = started.elapsed().as_secs_f64();

        let final_state = self.state;
        let stats = self.session.close();

        tracing::info!(
            state = %final_state,
            pages = result.pages_crawled,
            articles_found = result.articles_found,
            articles_processed = result.articles_processed,
            errors = result.errors.len(),
            requests = stats.requests,
            "Crawl finished"
        );

        result
    }
}
