//! Feed plugin for RSS, Atom and JSON Feed sources

use crate::crawler::{resolve_link, FetchSession, Page};
use crate::plugins::text::{clean_text, html_to_text};
use crate::plugins::{ExtractedArticle, PluginError, SourcePlugin};
use crate::storage::Source;
use async_trait::async_trait;
use chrono::Utc;
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// Plugin reading articles from a syndication feed
///
/// The crawled page is ignored: the feed is fetched again from the source
/// URL through the crawl's session and parsed as a whole. Feeds have no
/// pagination.
pub struct FeedPlugin {
    feed_url: Url,
    source_id: String,
    source_name: String,
}

impl FeedPlugin {
    pub fn new(source: &Source) -> Result<Self, PluginError> {
        let feed_url = Url::parse(&source.url).map_err(|e| PluginError::InvalidSource {
            source_id: source.id.clone(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            feed_url,
            source_id: source.id.clone(),
            source_name: source.name.clone(),
        })
    }

    /// Parses feed bytes into articles attributed to this plugin's source
    pub fn parse(&self, bytes: &[u8]) -> Result<Vec<ExtractedArticle>, PluginError> {
        let feed = feed_rs::parser::parse(bytes).map_err(|e| PluginError::Feed {
            url: self.feed_url.to_string(),
            reason: e.to_string(),
        })?;

        let total = feed.entries.len();
        let mut raw_dates = raw_entry_dates(bytes);
        if raw_dates.len() != total {
            tracing::debug!(feed = %self.feed_url, "Entry dates do not line up, using parsed dates");
            raw_dates = vec![None; total];
        }

        let articles: Vec<ExtractedArticle> = feed
            .entries
            .into_iter()
            .zip(raw_dates)
            .filter_map(|(entry, raw_date)| {
                let title = clean_text(&entry.title.map(|t| t.content).unwrap_or_default());
                let url = entry.links.first().map(|l| l.href.trim().to_string())?;
                if title.is_empty() || url.is_empty() {
                    return None;
                }

                let body = entry
                    .summary
                    .map(|s| s.content)
                    .or_else(|| entry.content.and_then(|c| c.body))
                    .unwrap_or_default();

                Some(ExtractedArticle {
                    title,
                    content: html_to_text(&body),
                    url,
                    author: entry.authors.into_iter().next().map(|p| p.name),
                    publish_time: raw_date
                        .or_else(|| entry.published.or(entry.updated).map(|t| t.to_rfc3339())),
                    category: entry.categories.into_iter().next().map(|c| c.term),
                    source_id: self.source_id.clone(),
                    source_name: self.source_name.clone(),
                    extracted_at: Utc::now(),
                })
            })
            .collect();

        tracing::debug!(
            feed = %self.feed_url,
            entries = total,
            articles = articles.len(),
            "Parsed feed"
        );

        Ok(articles)
    }
}

const PUBLISHED_TAGS: &[&str] = &["pubdate", "published", "dc:date", "issued"];
const UPDATED_TAGS: &[&str] = &["updated", "modified", "dc:modified"];

/// Date text of every feed entry as the feed wrote it, in document order
///
/// Publish dates stay opaque strings, including ones feed-rs cannot parse.
/// The published date wins over the updated one.
fn raw_entry_dates(bytes: &[u8]) -> Vec<Option<String>> {
    let text = String::from_utf8_lossy(bytes);
    if text.trim_start().starts_with('{') {
        return json_entry_dates(&text);
    }

    let document = Html::parse_document(&text);
    let Ok(entries) = Selector::parse("item, entry") else {
        return Vec::new();
    };

    document
        .select(&entries)
        .map(|entry| {
            let child_text = |tags: &[&str]| {
                entry
                    .children()
                    .filter_map(ElementRef::wrap)
                    .filter(|child| tags.iter().any(|tag| *tag == child.value().name()))
                    .map(|child| child.text().collect::<String>().trim().to_string())
                    .find(|date| !date.is_empty())
            };
            child_text(PUBLISHED_TAGS).or_else(|| child_text(UPDATED_TAGS))
        })
        .collect()
}

fn json_entry_dates(text: &str) -> Vec<Option<String>> {
    let Ok(feed) = serde_json::from_str::<serde_json::Value>(text) else {
        return Vec::new();
    };
    let Some(items) = feed.get("items").and_then(|items| items.as_array()) else {
        return Vec::new();
    };

    items
        .iter()
        .map(|item| {
            ["date_published", "date_modified"]
                .iter()
                .filter_map(|key| item.get(*key).and_then(|date| date.as_str()))
                .map(|date| date.trim().to_string())
                .find(|date| !date.is_empty())
        })
        .collect()
}

#[async_trait]
impl SourcePlugin for FeedPlugin {
    fn name(&self) -> &str {
        "rss"
    }

    async fn extract_articles(
        &self,
        _page: &Page,
        session: &FetchSession,
    ) -> Result<Vec<ExtractedArticle>, PluginError> {
        let attempt = session.fetch(&self.feed_url).await;
        let fetched = attempt.outcome.map_err(|failure| PluginError::Fetch {
            url: failure.url,
            error: failure.error,
        })?;
        self.parse(fetched.body.as_bytes())
    }

    fn next_page_url(&self, _page: &Page) -> Option<Url> {
        None
    }
}

/// Finds feed URLs advertised by a web page
///
/// Looks at `<link>` elements typed as RSS, Atom or JSON Feed and resolves
/// their hrefs against the page URL.
///
/// ```
/// use news_engine::plugins::discover_feed_urls;
/// use url::Url;
///
/// let html = r#"<head><link rel="alternate" type="application/rss+xml" href="/rss.xml"></head>"#;
/// let base = Url::parse("https://example.com/news/").unwrap();
/// let feeds = discover_feed_urls(html, &base);
/// assert_eq!(feeds[0].as_str(), "https://example.com/rss.xml");
/// ```
pub fn discover_feed_urls(html: &str, base_url: &Url) -> Vec<Url> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse(
        r#"link[type="application/rss+xml"], link[type="application/atom+xml"], link[type="application/feed+json"]"#,
    ) else {
        return Vec::new();
    };

    let mut feeds: Vec<Url> = Vec::new();
    for element in document.select(&selector) {
        if let Some(url) = element
            .value()
            .attr("href")
            .and_then(|href| resolve_link(href, base_url))
        {
            if !feeds.contains(&url) {
                feeds.push(url);
            }
        }
    }
    feeds
}
