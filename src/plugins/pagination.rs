//! Next-page discovery for list pages
//!
//! A next page is accepted only if it stays on the current host, stays inside
//! the plugin's content area and differs from the current URL.

use crate::crawler::resolve_link;
use crate::same_host;
use regex::Regex;
use scraper::{Html, Selector};
use std::sync::LazyLock;
use url::Url;

/// Page-number patterns tried against the current URL, in order
static PAGE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [r"(\d+)\.s?html?$", r"page=(\d+)", r"p=(\d+)"]
        .iter()
        .map(|p| Regex::new(p).expect("valid regex"))
        .collect()
});

/// Region of a site a plugin is allowed to paginate into
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentArea {
    /// Path must contain the keyword (case-insensitive)
    PathKeyword(String),
    /// Path must start with the prefix
    PathPrefix(String),
}

impl ContentArea {
    /// Content area covering the directory of `url`
    pub fn directory_of(url: &Url) -> Self {
        let path = url.path();
        let dir = match path.rfind('/') {
            Some(idx) => &path[..=idx],
            None => "/",
        };
        Self::PathPrefix(dir.to_string())
    }

    pub fn contains(&self, url: &Url) -> bool {
        match self {
            Self::PathKeyword(keyword) => url
                .path()
                .to_lowercase()
                .contains(&keyword.to_lowercase()),
            Self::PathPrefix(prefix) => url.path().starts_with(prefix.as_str()),
        }
    }
}

/// Returns true if `next` is an acceptable next page for `current`
pub fn is_valid_next_page(next: &Url, current: &Url, area: &ContentArea) -> bool {
    same_host(next, current) && area.contains(next) && next != current
}

/// Finds the next page from link selectors, falling back to URL inference
///
/// Selectors are tried in order; the first matching element whose href
/// validates wins.
pub fn find_next_page(
    document: &Html,
    current: &Url,
    selectors: &[Selector],
    area: &ContentArea,
) -> Option<Url> {
    for selector in selectors {
        let Some(element) = document.select(selector).next() else {
            continue;
        };
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        if let Some(next) = resolve_link(href, current) {
            if is_valid_next_page(&next, current, area) {
                return Some(next);
            }
        }
    }

    infer_next_page(current, area)
}

/// Infers the next page by incrementing a page number in the URL
///
/// The first pattern that matches has its number incremented in place;
/// surrounding text is kept.
///
/// ```
/// use news_engine::plugins::{infer_next_page, ContentArea};
/// use url::Url;
///
/// let current = Url::parse("https://news.example.com/news/3.html").unwrap();
/// let area = ContentArea::PathKeyword("news".to_string());
/// let next = infer_next_page(&current, &area).unwrap();
/// assert_eq!(next.as_str(), "https://news.example.com/news/4.html");
/// ```
pub fn infer_next_page(current: &Url, area: &ContentArea) -> Option<Url> {
    let current_str = current.as_str();

    for pattern in PAGE_PATTERNS.iter() {
        let Some(number) = pattern.captures(current_str).and_then(|c| c.get(1)) else {
            continue;
        };
        let Some(next_number) = number
            .as_str()
            .parse::<u64>()
            .ok()
            .and_then(|n| n.checked_add(1))
        else {
            continue;
        };

        let candidate = format!(
            "{}{}{}",
            &current_str[..number.start()],
            next_number,
            &current_str[number.end()..]
        );

        if let Ok(next) = Url::parse(&candidate) {
            if is_valid_next_page(&next, current, area) {
                return Some(next);
            }
        }
    }

    None
}
