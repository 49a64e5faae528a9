use crate::common::{fast_crawler, html, source};
use news_engine::crawler::{crawl_source, CrawlError, FetchSession};
use news_engine::plugins::discover_feed_urls;
use news_engine::PluginRegistry;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Local Feed</title>
    <link>https://example.com/</link>
    <description>Latest</description>
    <item>
      <title>Harbor reopens</title>
      <link>https://example.com/harbor</link>
      <description>&lt;p&gt;The harbor &lt;b&gt;reopened&lt;/b&gt; today.&lt;/p&gt;</description>
      <author>desk@example.com (News Desk)</author>
      <category>Local</category>
      <pubDate>Wed, 01 May 2024 10:30:00 GMT</pubDate>
    </item>
    <item>
      <title>Rail line extended</title>
      <link>https://example.com/rail</link>
      <description>Two new stations.</description>
    </item>
  </channel>
</rss>"#;

#[tokio::test]
async fn test_feed_source_crawl() {
    let server = MockServer::start().await;

    // once by the crawl loop, once by the plugin
    Mock::given(method("GET"))
        .and(path("/rss.xml"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(RSS)
                .insert_header("content-type", "application/rss+xml"),
        )
        .expect(2)
        .mount(&server)
        .await;

    let source = source("feed", &format!("{}/rss.xml", server.uri()), "rss");
    let result = crawl_source(&source, &PluginRegistry::with_defaults(), &fast_crawler(0), None)
        .await
        .unwrap();

    assert_eq!(result.pages_crawled, 1);
    assert_eq!(result.articles_found, 2);
    assert!(result.errors.is_empty());

    let harbor = &result.articles[0];
    assert_eq!(harbor.title, "Harbor reopens");
    assert_eq!(harbor.url, "https://example.com/harbor");
    assert_eq!(harbor.content, "The harbor reopened today.");
    assert_eq!(harbor.category.as_deref(), Some("Local"));
    assert_eq!(harbor.publish_time.as_deref(), Some("Wed, 01 May 2024 10:30:00 GMT"));
    assert_eq!(harbor.source_id, "feed");
    assert_eq!(result.articles[1].content, "Two new stations.");
}

#[tokio::test]
async fn test_invalid_feed_is_a_session_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rss.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string("this is not a feed"))
        .mount(&server)
        .await;

    let source = source("feed", &format!("{}/rss.xml", server.uri()), "rss");
    let result = crawl_source(&source, &PluginRegistry::with_defaults(), &fast_crawler(0), None)
        .await
        .unwrap();

    assert_eq!(result.pages_crawled, 1);
    assert!(result.articles.is_empty());
    assert_eq!(result.errors.len(), 1);
    assert!(matches!(
        &result.errors[0],
        CrawlError::Session { kind, page: 1, .. } if kind == "crawler_error"
    ));
}

#[tokio::test]
async fn test_discover_feeds_on_served_page() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(
            r#"<html><head>
                 <link rel="alternate" type="application/rss+xml" href="/rss.xml">
                 <link rel="alternate" type="application/atom+xml" href="https://feeds.example.com/atom">
                 <link rel="stylesheet" href="/site.css">
               </head><body></body></html>"#
                .to_string(),
        ))
        .mount(&server)
        .await;

    let session = FetchSession::new(&fast_crawler(0)).unwrap();
    let page = session
        .fetch(&Url::parse(&format!("{}/", server.uri())).unwrap())
        .await
        .outcome
        .unwrap();

    let feeds: Vec<String> = discover_feed_urls(&page.body, &page.url)
        .into_iter()
        .map(|u| u.to_string())
        .collect();
    assert_eq!(
        feeds,
        vec![
            format!("{}/rss.xml", server.uri()),
            "https://feeds.example.com/atom".to_string(),
        ]
    );
}
