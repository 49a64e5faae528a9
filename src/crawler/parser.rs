//! HTML parsing and link extraction
//!
//! Documents are parsed on demand from a `Page`, which only holds the URL
//! and the raw text, so pages can cross await points while parsed trees
//! stay inside synchronous code.

use scraper::{Html, Selector};
use std::collections::HashSet;
use url::Url;

/// File types never followed as links
const DENIED_EXTENSIONS: &[&str] = &[".pdf", ".doc", ".docx", ".xls", ".xlsx", ".zip", ".rar"];

/// A fetched page handed to extraction plugins
#[derive(Debug, Clone)]
pub struct Page {
    /// URL the body was served from
    pub url: Url,
    /// Raw response text
    pub body: String,
}

impl Page {
    pub fn new(url: Url, body: impl Into<String>) -> Self {
        Self {
            url,
            body: body.into(),
        }
    }

    /// Parses the body into a document tree
    pub fn document(&self) -> Html {
        parse_document(&self.body)
    }
}

/// Parses raw HTML text into a traversable document
///
/// Parsing is lenient: malformed markup yields a best-effort tree rather
/// than an error.
pub fn parse_document(html: &str) -> Html {
    Html::parse_document(html)
}

/// Extracts the page title from the `<title>` element
pub fn extract_title(document: &Html) -> Option<String> {
    let title_selector = Selector::parse("title").ok()?;

    document
        .select(&title_selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Extracts every followable link from a document
///
/// # Link Extraction Rules
///
/// **Include:**
/// - `<a href="...">` resolved against `base_url`
///
/// **Exclude:**
/// - `javascript:`, `mailto:`, `tel:` links and data URIs
/// - Fragment-only links
/// - Anything failing `is_valid_link`
///
/// # Example
///
/// ```
/// use news_engine::crawler::{extract_links, parse_document};
/// use url::Url;
///
/// let doc = parse_document(r#"<a href="/a1">A</a><a href="/report.pdf">PDF</a>"#);
/// let base = Url::parse("https://example.com/list/1.html").unwrap();
/// let links = extract_links(&doc, &base);
/// assert_eq!(links.len(), 1);
/// ```
pub fn extract_links(document: &Html, base_url: &Url) -> HashSet<Url> {
    let mut links = HashSet::new();

    if let Ok(a_selector) = Selector::parse("a[href]") {
        for element in document.select(&a_selector) {
            if let Some(href) = element.value().attr("href") {
                if let Some(url) = resolve_link(href, base_url) {
                    links.insert(url);
                }
            }
        }
    }

    links
}

/// Resolves an href against a base URL, returning it only if followable
pub fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if lower.starts_with("javascript:")
        || lower.starts_with("mailto:")
        || lower.starts_with("tel:")
        || lower.starts_with("data:")
    {
        return None;
    }

    base_url.join(href).ok().filter(is_valid_link)
}

/// Returns true if a URL may be followed by the crawler
///
/// The scheme must be http or https, the host non-empty, and the path must
/// not end in a document or archive extension.
pub fn is_valid_link(url: &Url) -> bool {
    if url.scheme() != "http" && url.scheme() != "https" {
        return false;
    }

    if url.host_str().map_or(true, str::is_empty) {
        return false;
    }

    let path = url.path().to_ascii_lowercase();
    !DENIED_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}
