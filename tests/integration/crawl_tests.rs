use crate::common::{fast_crawler, html, list_page, source};
use async_trait::async_trait;
use chrono::Utc;
use news_engine::crawler::{crawl_source, CrawlError, FetchSession, Page};
use news_engine::plugins::PluginError;
use news_engine::storage::Source;
use news_engine::{ExtractedArticle, PluginRegistry, SourcePlugin};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use url::Url;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_single_page_then_missing_next_page() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/list/1.html"))
        .respond_with(html(list_page(&[("Report A", "/a1")])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/list/2.html"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let source = source("local", &format!("{}/list/1.html", server.uri()), "generic");
    let result = crawl_source(&source, &PluginRegistry::with_defaults(), &fast_crawler(1), None)
        .await
        .unwrap();

    assert_eq!(result.articles_found, 1);
    assert_eq!(result.articles_processed, 1);
    assert_eq!(result.pages_crawled, 1);
    assert_eq!(result.articles[0].title, "Report A");
    assert_eq!(result.articles[0].url, format!("{}/a1", server.uri()));
    assert_eq!(result.articles[0].publish_time.as_deref(), Some("2024-05-01 10:30"));

    assert_eq!(result.errors.len(), 1);
    match &result.errors[0] {
        CrawlError::Fetch { url, retries, .. } => {
            assert!(url.ends_with("/list/2.html"));
            assert_eq!(*retries, 1);
        }
        other => panic!("expected a fetch error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_server_error_exhausts_retries() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500))
        .expect(4)
        .mount(&server)
        .await;

    let session = FetchSession::new(&fast_crawler(3)).unwrap();
    let url = Url::parse(&format!("{}/broken", server.uri())).unwrap();
    let attempt = session.fetch(&url).await;

    assert_eq!(attempt.attempts, 4);
    let failure = attempt.outcome.unwrap_err();
    assert_eq!(failure.retries, 3);
    assert!(failure.error.contains("500"));

    let stats = session.close();
    assert_eq!(stats.requests, 4);
    assert_eq!(stats.failures, 1);
}

#[tokio::test]
async fn test_endless_pagination_is_bounded() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path_regex(r"^/news/\d+\.html$"))
        .respond_with(html(list_page(&[("Same story", "/story")])))
        .expect(3)
        .mount(&server)
        .await;

    let source = source("endless", &format!("{}/news/1.html", server.uri()), "generic");
    let result = crawl_source(&source, &PluginRegistry::with_defaults(), &fast_crawler(0), Some(3))
        .await
        .unwrap();

    assert_eq!(result.pages_crawled, 3);
    assert_eq!(result.articles_found, 3);
    // the same article on every page is kept once
    assert_eq!(result.articles_processed, 1);
    assert!(result.errors.is_empty());
}

#[tokio::test]
async fn test_next_page_link_is_followed() {
    let server = MockServer::start().await;

    let first = format!(
        "{}<a class=\"next\" href=\"/news/page-two.html\">Next</a>",
        list_page(&[("First", "/news/first")])
    );
    Mock::given(method("GET"))
        .and(path("/news/index.html"))
        .respond_with(html(first))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/news/page-two.html"))
        .respond_with(html(list_page(&[("Second", "/news/second")])))
        .mount(&server)
        .await;

    let source = source("paged", &format!("{}/news/index.html", server.uri()), "sina");
    let result = crawl_source(&source, &PluginRegistry::with_defaults(), &fast_crawler(0), None)
        .await
        .unwrap();

    assert_eq!(result.pages_crawled, 2);
    let titles: Vec<&str> = result.articles.iter().map(|a| a.title.as_str()).collect();
    assert_eq!(titles, vec!["First", "Second"]);
    assert!(result.errors.is_empty());
}

#[tokio::test]
async fn test_page_without_items_falls_back_to_title() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/story/index.html"))
        .respond_with(html(
            "<html><head><title>Lone story</title></head>\
             <body><div class=\"article-content\">The full text.</div></body></html>"
                .to_string(),
        ))
        .mount(&server)
        .await;

    let source = source("single", &format!("{}/story/index.html", server.uri()), "generic");
    let result = crawl_source(&source, &PluginRegistry::with_defaults(), &fast_crawler(0), Some(1))
        .await
        .unwrap();

    assert_eq!(result.articles_found, 1);
    assert_eq!(result.articles[0].title, "Lone story");
    assert_eq!(result.articles[0].content, "The full text.");
}

#[tokio::test]
async fn test_unknown_plugin_is_rejected() {
    let source = source("odd", "https://example.com/", "carrier-pigeon");
    let result =
        crawl_source(&source, &PluginRegistry::with_defaults(), &fast_crawler(0), None).await;
    assert!(result.is_err());
}

/// Extracts one article per page until the site layout "changes" on page 2
struct LayoutChangePlugin {
    source_id: String,
    calls: AtomicUsize,
}

fn layout_change_plugin(source: &Source) -> Result<Arc<dyn SourcePlugin>, PluginError> {
    Ok(Arc::new(LayoutChangePlugin {
        source_id: source.id.clone(),
        calls: AtomicUsize::new(0),
    }))
}

#[async_trait]
impl SourcePlugin for LayoutChangePlugin {
    fn name(&self) -> &str {
        "layout-change"
    }

    async fn extract_articles(
        &self,
        page: &Page,
        _session: &FetchSession,
    ) -> Result<Vec<ExtractedArticle>, PluginError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) > 0 {
            return Err(PluginError::Selector("no .news-item on page".to_string()));
        }

        let article = |href: &str, title: &str| ExtractedArticle {
            title: title.to_string(),
            content: format!("{} body", title),
            url: page.url.join(href).unwrap().to_string(),
            author: None,
            publish_time: None,
            category: None,
            source_id: self.source_id.clone(),
            source_name: "Layout news".to_string(),
            extracted_at: Utc::now(),
        };
        Ok(vec![article("/a1", "Report A"), article("/a2", "Report B")])
    }

    fn next_page_url(&self, page: &Page) -> Option<Url> {
        page.url.join("/list/2.html").ok().filter(|next| next != &page.url)
    }
}

#[tokio::test]
async fn test_later_page_failure_keeps_earlier_articles() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path_regex(r"^/list/[12]\.html$"))
        .respond_with(html(list_page(&[("Ignored", "/x")])))
        .expect(2)
        .mount(&server)
        .await;

    let mut plugins = PluginRegistry::with_defaults();
    plugins.register("layout-change", layout_change_plugin);

    let source = source("local", &format!("{}/list/1.html", server.uri()), "layout-change");
    let result = crawl_source(&source, &plugins, &fast_crawler(0), None)
        .await
        .unwrap();

    assert_eq!(result.pages_crawled, 2);
    assert_eq!(result.articles_found, 2);
    let titles: Vec<&str> = result.articles.iter().map(|a| a.title.as_str()).collect();
    assert_eq!(titles, ["Report A", "Report B"]);
    assert_eq!(result.articles[0].url, format!("{}/a1", server.uri()));

    assert_eq!(result.errors.len(), 1);
    match &result.errors[0] {
        CrawlError::Session { page, error, .. } => {
            assert_eq!(*page, 2);
            assert!(error.contains("no .news-item"));
        }
        other => panic!("expected a session error, got {:?}", other),
    }
}
