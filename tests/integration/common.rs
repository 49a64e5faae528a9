use news_engine::config::{parse_config, Config, CrawlerConfig};
use news_engine::storage::{Source, SourceKind};
use wiremock::ResponseTemplate;

/// Crawler settings with millisecond delays
pub fn fast_crawler(max_retries: u32) -> CrawlerConfig {
    CrawlerConfig {
        delay_ms: 1,
        max_retries,
        ..CrawlerConfig::default()
    }
}

pub fn source(id: &str, url: &str, plugin: &str) -> Source {
    Source {
        id: id.to_string(),
        name: format!("{} news", id),
        url: url.to_string(),
        kind: if plugin == "rss" {
            SourceKind::Rss
        } else {
            SourceKind::Website
        },
        plugin: plugin.to_string(),
        active: true,
        crawl_interval_secs: 300,
        last_crawl_at: None,
    }
}

/// A validated configuration with one source and fast crawler settings
pub fn config_with_source(id: &str, url: &str, plugin: &str) -> Config {
    let toml = format!(
        r#"
[crawler]
delay-ms = 1
max-retries = 1
max-pages = 5

[pipeline]
batch-size = 10
chain-stages = true

[[source]]
id = "{id}"
name = "{id} news"
url = "{url}"
plugin = "{plugin}"
"#
    );
    parse_config(&toml).expect("test config is valid")
}

/// A list page with one `.news-item` per `(title, href)` pair
pub fn list_page(items: &[(&str, &str)]) -> String {
    let items: String = items
        .iter()
        .map(|(title, href)| {
            format!(
                r#"<div class="news-item">
                     <h2><a href="{href}">{title}</a></h2>
                     <p class="summary">{title} summary text.</p>
                     <span class="time">2024-05-01 10:30</span>
                   </div>"#
            )
        })
        .collect();
    format!(
        "<html><head><title>Latest news</title></head><body>{}</body></html>",
        items
    )
}

pub fn html(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(body)
        .insert_header("content-type", "text/html; charset=utf-8")
}
