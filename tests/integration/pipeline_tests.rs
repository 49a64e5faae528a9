use crate::common::{config_with_source, html, list_page};
use news_engine::config::StorageConfig;
use news_engine::pipeline::tasks::{PROCESS_NEWS_TASK, START_CRAWLER_TASK};
use news_engine::pipeline::{
    InMemoryBroker, InMemoryTaskRegistry, Pipeline, QueueName, TaskFilter, TaskStatus,
};
use news_engine::storage::{article_id, open_store, ArticleStatus};
use serde_json::{json, Map};
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn news_site() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/list/1.html"))
        .respond_with(html(list_page(&[
            ("Chip makers report strong growth", "/a1"),
            ("Football league final draws record crowd", "/a2"),
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/list/2.html"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    server
}

fn crawl_task(pipeline: &Pipeline, source_id: &str) -> String {
    pipeline
        .router()
        .dispatch(START_CRAWLER_TASK, vec![json!(source_id)], Map::new())
        .unwrap()
}

#[tokio::test]
async fn test_crawl_process_index_flow() {
    let server = news_site().await;
    let config = config_with_source("local", &format!("{}/list/1.html", server.uri()), "generic");
    let pipeline = Arc::new(Pipeline::in_memory(config));
    pipeline.seed_sources().unwrap();

    let task_id = crawl_task(&pipeline, "local");
    // crawl, then one chained process task and one chained index task
    assert_eq!(pipeline.drain().await.unwrap(), 3);

    let record = pipeline.registry().get(&task_id).unwrap();
    assert_eq!(record.status, TaskStatus::Succeeded);
    assert_eq!(record.source_id.as_deref(), Some("local"));
    assert_eq!(record.articles_found, 2);
    assert_eq!(record.articles_processed, 2);

    let result = record.result.unwrap();
    assert_eq!(result["pages_crawled"], 1);
    assert_eq!(result["errors"][0]["retries"], 1);

    let store = pipeline.store();
    assert!(store.get_source("local").unwrap().unwrap().last_crawl_at.is_some());

    let chips = store
        .get_article(&article_id(&format!("{}/a1", server.uri())))
        .unwrap()
        .unwrap();
    assert_eq!(chips.status, ArticleStatus::Indexed);
    let analysis = chips.analysis.unwrap();
    assert_eq!(analysis.category, "technology");

    let football = store
        .get_document(&article_id(&format!("{}/a2", server.uri())))
        .unwrap()
        .unwrap();
    assert_eq!(football.category, "sports");
    assert_eq!(store.document_count().unwrap(), 2);

    let finished = pipeline.registry().list(&TaskFilter {
        status: Some(TaskStatus::Succeeded),
        ..Default::default()
    });
    assert_eq!(finished.len(), 3);
}

#[tokio::test]
async fn test_redelivered_crawl_does_not_duplicate_articles() {
    let server = news_site().await;
    let mut config =
        config_with_source("local", &format!("{}/list/1.html", server.uri()), "generic");
    config.pipeline.chain_stages = false;
    let pipeline = Arc::new(Pipeline::in_memory(config));
    pipeline.seed_sources().unwrap();

    let task_id = crawl_task(&pipeline, "local");

    // a worker takes the message and is lost before acknowledging it
    let lost = pipeline.broker().try_consume(QueueName::Crawler).unwrap().unwrap();
    assert_eq!(lost.message.id, task_id);
    assert_eq!(pipeline.broker().requeue_unacked().unwrap(), 1);

    assert_eq!(pipeline.drain().await.unwrap(), 1);
    let record = pipeline.registry().get(&task_id).unwrap();
    assert_eq!(record.status, TaskStatus::Succeeded);
    assert_eq!(record.deliveries, 2);

    // running the same crawl again overwrites the same records
    crawl_task(&pipeline, "local");
    pipeline.drain().await.unwrap();

    let counts = pipeline.store().count_by_status().unwrap();
    assert_eq!(counts.get(&ArticleStatus::Pending), Some(&2));
    assert_eq!(counts.values().sum::<u64>(), 2);
}

#[tokio::test]
async fn test_process_rerun_is_idempotent() {
    let server = news_site().await;
    let mut config =
        config_with_source("local", &format!("{}/list/1.html", server.uri()), "generic");
    config.pipeline.chain_stages = false;
    let pipeline = Arc::new(Pipeline::in_memory(config));
    pipeline.seed_sources().unwrap();

    crawl_task(&pipeline, "local");
    pipeline.drain().await.unwrap();

    let id = article_id(&format!("{}/a1", server.uri()));
    let process = |pipeline: &Pipeline| {
        pipeline
            .router()
            .dispatch(PROCESS_NEWS_TASK, vec![json!([id.clone()])], Map::new())
            .unwrap()
    };

    let first_task = process(&pipeline);
    pipeline.drain().await.unwrap();
    let first = pipeline.store().get_article(&id).unwrap().unwrap();

    let second_task = process(&pipeline);
    pipeline.drain().await.unwrap();
    let second = pipeline.store().get_article(&id).unwrap().unwrap();

    assert_eq!(first.status, ArticleStatus::Processed);
    assert_eq!(second.status, first.status);
    let (a, b) = (first.analysis.unwrap(), second.analysis.unwrap());
    assert_eq!(a.fingerprint, b.fingerprint);
    assert_eq!(a.keywords, b.keywords);
    assert_eq!(a.category, b.category);
    assert_eq!(a.sentiment_label, b.sentiment_label);

    for task_id in [first_task, second_task] {
        let record = pipeline.registry().get(&task_id).unwrap();
        assert_eq!(record.status, TaskStatus::Succeeded);
        assert_eq!(record.result.unwrap()["succeeded"], 1);
    }
}

#[tokio::test]
async fn test_inactive_source_skipped_unless_forced() {
    let server = news_site().await;
    let config = config_with_source("local", &format!("{}/list/1.html", server.uri()), "generic");
    let pipeline = Arc::new(Pipeline::in_memory(config));
    pipeline.seed_sources().unwrap();
    pipeline.store().set_active("local", false).unwrap();

    let skipped = crawl_task(&pipeline, "local");
    pipeline.drain().await.unwrap();
    let record = pipeline.registry().get(&skipped).unwrap();
    assert_eq!(record.status, TaskStatus::Succeeded);
    assert_eq!(record.result.unwrap()["status"], "skipped");

    let forced = pipeline
        .router()
        .dispatch(
            START_CRAWLER_TASK,
            vec![json!("local"), json!(null), json!(true)],
            Map::new(),
        )
        .unwrap();
    pipeline.drain().await.unwrap();
    let record = pipeline.registry().get(&forced).unwrap();
    assert_eq!(record.articles_found, 2);
}

#[tokio::test]
async fn test_sqlite_backed_pipeline_persists() {
    let server = news_site().await;
    let dir = TempDir::new().unwrap();
    let storage = StorageConfig {
        database_path: Some(dir.path().join("news.db").to_string_lossy().into_owned()),
    };

    let config = config_with_source("local", &format!("{}/list/1.html", server.uri()), "generic");
    let pipeline = Arc::new(Pipeline::new(
        config,
        open_store(&storage).unwrap(),
        Arc::new(InMemoryBroker::new()),
        Arc::new(InMemoryTaskRegistry::new()),
    ));
    pipeline.seed_sources().unwrap();
    crawl_task(&pipeline, "local");
    pipeline.drain().await.unwrap();
    drop(pipeline);

    let reopened = open_store(&storage).unwrap();
    assert_eq!(reopened.document_count().unwrap(), 2);
    let counts = reopened.count_by_status().unwrap();
    assert_eq!(counts.get(&ArticleStatus::Indexed), Some(&2));
}
