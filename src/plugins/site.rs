//! Selector-driven site plugins
//!
//! A `SiteProfile` names the CSS selectors used to find list items and their
//! fields on a site's list pages. `SelectorPlugin` compiles a profile once and
//! applies it to every page of a crawl.

use crate::crawler::{extract_title, resolve_link, FetchSession, Page};
use crate::plugins::pagination::{find_next_page, ContentArea};
use crate::plugins::text::{clean_text, element_text, select_text};
use crate::plugins::{ExtractedArticle, PluginError, SourcePlugin};
use crate::storage::Source;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// CSS selectors describing one family of list pages
#[derive(Debug, Clone, Copy)]
pub struct SiteProfile {
    pub name: &'static str,
    /// List items, tried first
    pub items: &'static str,
    /// List items, tried when the primary selector finds nothing
    pub fallback_items: &'static str,
    pub title: &'static str,
    pub content: &'static str,
    pub author: &'static str,
    pub publish_time: &'static str,
    pub category: &'static str,
    /// Next-page link selectors, in priority order
    pub next_page: &'static [&'static str],
    /// Main content containers for the single-article fallback
    pub page_content: &'static [&'static str],
}

pub const SINA_PROFILE: SiteProfile = SiteProfile {
    name: "sina",
    items: ".news-item, .news-card, .feed-item",
    fallback_items: "article, .news, .post",
    title: "h1, h2, h3, .title, .headline",
    content: ".article-content, .content, .summary",
    author: ".author, .reporter, .writer",
    publish_time: ".time, .date, .publish-time",
    category: ".category, .channel, .tag",
    next_page: &[".next, .pagination .next, a[rel=\"next\"]", ".pagination a, .page-num a"],
    page_content: &[
        ".article-content",
        ".content",
        ".main-content",
        "article",
        ".post-content",
    ],
};

pub const GENERIC_PROFILE: SiteProfile = SiteProfile {
    name: "generic",
    ..SINA_PROFILE
};

struct CompiledProfile {
    items: Selector,
    fallback_items: Selector,
    title: Selector,
    link: Selector,
    content: Selector,
    author: Selector,
    publish_time: Selector,
    category: Selector,
    next_page: Vec<Selector>,
    page_content: Vec<Selector>,
}

fn compile(selector: &str) -> Result<Selector, PluginError> {
    Selector::parse(selector).map_err(|_| PluginError::Selector(selector.to_string()))
}

impl CompiledProfile {
    fn new(profile: &SiteProfile) -> Result<Self, PluginError> {
        Ok(Self {
            items: compile(profile.items)?,
            fallback_items: compile(profile.fallback_items)?,
            title: compile(profile.title)?,
            link: compile("a[href]")?,
            content: compile(profile.content)?,
            author: compile(profile.author)?,
            publish_time: compile(profile.publish_time)?,
            category: compile(profile.category)?,
            next_page: profile
                .next_page
                .iter()
                .map(|s| compile(s))
                .collect::<Result<_, _>>()?,
            page_content: profile
                .page_content
                .iter()
                .map(|s| compile(s))
                .collect::<Result<_, _>>()?,
        })
    }
}

/// Site plugin driven by a `SiteProfile`
///
/// `extract` also finds the next page while the document is parsed and keeps
/// it until `next_page_url` asks for it, so a page is parsed once per crawl.
pub struct SelectorPlugin {
    name: &'static str,
    selectors: CompiledProfile,
    area: ContentArea,
    source_id: String,
    source_name: String,
    next_pages: DashMap<Url, Option<Url>>,
}

impl SelectorPlugin {
    /// Builds a plugin for `source` from a profile and a pagination area
    pub fn new(
        profile: &SiteProfile,
        area: ContentArea,
        source: &Source,
    ) -> Result<Self, PluginError> {
        Ok(Self {
            name: profile.name,
            selectors: CompiledProfile::new(profile)?,
            area,
            source_id: source.id.clone(),
            source_name: source.name.clone(),
            next_pages: DashMap::new(),
        })
    }

    /// Sina list pages; pagination must stay on paths containing `news`
    pub fn sina(source: &Source) -> Result<Self, PluginError> {
        Self::new(
            &SINA_PROFILE,
            ContentArea::PathKeyword("news".to_string()),
            source,
        )
    }

    /// Any list site; pagination must stay under the source URL's directory
    pub fn generic(source: &Source) -> Result<Self, PluginError> {
        let url = Url::parse(&source.url).map_err(|e| PluginError::InvalidSource {
            source_id: source.id.clone(),
            reason: e.to_string(),
        })?;
        Self::new(&GENERIC_PROFILE, ContentArea::directory_of(&url), source)
    }

    /// Extracts the articles listed on a page
    ///
    /// Items are read independently; an item without a title or link is
    /// skipped. A page with no usable items yields at most one article built
    /// from the page title and its main content container.
    pub fn extract(&self, page: &Page) -> Vec<ExtractedArticle> {
        let document = page.document();

        let mut items: Vec<ElementRef<'_>> = document.select(&self.selectors.items).collect();
        if items.is_empty() {
            items = document.select(&self.selectors.fallback_items).collect();
        }

        let mut articles: Vec<ExtractedArticle> = items
            .iter()
            .filter_map(|item| self.extract_item(item, &page.url))
            .collect();

        if articles.is_empty() {
            if let Some(article) = self.extract_from_page(&document, &page.url) {
                articles.push(article);
            }
        }

        tracing::debug!(
            plugin = self.name,
            url = %page.url,
            items = items.len(),
            articles = articles.len(),
            "Extracted list page"
        );

        let next = self.find_next(&document, &page.url);
        self.next_pages.insert(page.url.clone(), next);

        articles
    }

    fn find_next(&self, document: &Html, page_url: &Url) -> Option<Url> {
        find_next_page(document, page_url, &self.selectors.next_page, &self.area)
    }

    fn extract_item(&self, item: &ElementRef<'_>, page_url: &Url) -> Option<ExtractedArticle> {
        let title_element = item.select(&self.selectors.title).next();
        let title = title_element.as_ref().map(element_text).unwrap_or_default();
        let link = self.item_link(item, title_element.as_ref(), page_url);

        let (title, link) = match (clean_text(&title), link) {
            (title, Some(link)) if !title.is_empty() => (title, link),
            _ => {
                tracing::debug!(plugin = self.name, "Skipping list item without title or link");
                return None;
            }
        };

        let cleaned = |selector: &Selector| {
            select_text(item, selector)
                .map(|text| clean_text(&text))
                .filter(|text| !text.is_empty())
        };

        Some(ExtractedArticle {
            title,
            content: cleaned(&self.selectors.content).unwrap_or_default(),
            url: link.to_string(),
            author: cleaned(&self.selectors.author),
            publish_time: select_text(item, &self.selectors.publish_time),
            category: cleaned(&self.selectors.category),
            source_id: self.source_id.clone(),
            source_name: self.source_name.clone(),
            extracted_at: Utc::now(),
        })
    }

    /// Link of a list item: the title's own anchor first, then any anchor
    fn item_link(
        &self,
        item: &ElementRef<'_>,
        title: Option<&ElementRef<'_>>,
        page_url: &Url,
    ) -> Option<Url> {
        let href = title
            .and_then(|t| {
                if t.value().name() == "a" {
                    t.value().attr("href")
                } else {
                    t.select(&self.selectors.link)
                        .next()
                        .and_then(|a| a.value().attr("href"))
                }
            })
            .or_else(|| {
                if item.value().name() == "a" {
                    item.value().attr("href")
                } else {
                    item.select(&self.selectors.link)
                        .next()
                        .and_then(|a| a.value().attr("href"))
                }
            })?;

        resolve_link(href, page_url)
    }

    fn extract_from_page(&self, document: &Html, page_url: &Url) -> Option<ExtractedArticle> {
        let title = clean_text(&extract_title(document)?);

        let content = self
            .selectors
            .page_content
            .iter()
            .find_map(|selector| document.select(selector).next())
            .map(|element| clean_text(&element_text(&element)))
            .unwrap_or_default();

        if title.is_empty() || content.is_empty() {
            return None;
        }

        Some(ExtractedArticle {
            title,
            content,
            url: page_url.to_string(),
            author: None,
            publish_time: None,
            category: None,
            source_id: self.source_id.clone(),
            source_name: self.source_name.clone(),
            extracted_at: Utc::now(),
        })
    }
}

#[async_trait]
impl SourcePlugin for SelectorPlugin {
    fn name(&self) -> &str {
        self.name
    }

    async fn extract_articles(
        &self,
        page: &Page,
        _session: &FetchSession,
    ) -> Result<Vec<ExtractedArticle>, PluginError> {
        Ok(self.extract(page))
    }

    fn next_page_url(&self, page: &Page) -> Option<Url> {
        match self.next_pages.remove(&page.url) {
            Some((_, next)) => next,
            None => self.find_next(&page.document(), &page.url),
        }
    }
}
