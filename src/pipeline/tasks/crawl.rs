//! Crawl stage

use super::{dispatch_batches, sweep_payload, update_record, Task, TaskError};
use crate::crawler::crawl_source;
use crate::pipeline::context::TaskContext;
use crate::pipeline::Pipeline;
use crate::storage::StorageResult;
use chrono::Utc;
use serde_json::{json, Value};

fn skipped(source_id: &str, reason: &str) -> Value {
    json!({
        "status": "skipped",
        "source_id": source_id,
        "reason": reason,
    })
}

/// Crawls one source and stores what it found
///
/// Unknown sources, and inactive ones unless `force` is set, are skipped
/// without error. Articles are upserted under their URL-derived ids, so a
/// redelivered crawl overwrites rather than duplicates.
pub async fn start_crawl(
    pipeline: &Pipeline,
    ctx: &TaskContext,
    source_id: &str,
    max_pages: Option<u32>,
    force: bool,
) -> Result<Value, TaskError> {
    update_record(pipeline, ctx, |record| {
        record.source_id = Some(source_id.to_string())
    });

    let Some(source) = pipeline.store().get_source(source_id)? else {
        tracing::info!(source_id, "Skipping crawl of unknown source");
        return Ok(skipped(source_id, "unknown_source"));
    };
    if !source.active && !force {
        tracing::info!(source_id, "Skipping crawl of inactive source");
        return Ok(skipped(source_id, "inactive"));
    }

    tracing::info!(source_id, retries = ctx.retries, "Crawl task started");

    let result = crawl_source(&source, pipeline.plugins(), &pipeline.config().crawler, max_pages)
        .await
        .map_err(|e| TaskError::Crawl {
            source_id: source_id.to_string(),
            reason: e.to_string(),
        })?;

    let store = pipeline.store();
    let article_ids = result
        .articles
        .iter()
        .map(|article| store.upsert_article(article))
        .collect::<StorageResult<Vec<String>>>()?;
    store.record_crawl(&source.id, Utc::now())?;

    update_record(pipeline, ctx, |record| {
        record.articles_found = result.articles_found;
        record.articles_processed = result.articles_processed;
    });

    if pipeline.config().pipeline.chain_stages && !article_ids.is_empty() {
        let dispatched =
            dispatch_batches(pipeline, &article_ids, |article_ids| Task::ProcessNews {
                article_ids,
            })?;
        tracing::debug!(source_id, tasks = dispatched.len(), "Chained process tasks");
    }

    Ok(serde_json::to_value(&result)?)
}

/// Dispatches one crawl task per source id
pub fn batch_crawl(pipeline: &Pipeline, source_ids: &[String]) -> Result<Value, TaskError> {
    let task_ids = source_ids
        .iter()
        .map(|source_id| {
            pipeline.router().dispatch_task(&Task::StartCrawl {
                source_id: source_id.clone(),
                max_pages: None,
                force: false,
            })
        })
        .collect::<Result<Vec<String>, _>>()?;

    Ok(sweep_payload(source_ids.len(), task_ids))
}

/// Dispatches a crawl for every active source whose interval has elapsed
pub fn schedule_crawl(pipeline: &Pipeline) -> Result<Value, TaskError> {
    let now = Utc::now();
    let due: Vec<String> = pipeline
        .store()
        .list_sources()?
        .into_iter()
        .filter(|source| source.is_due(now))
        .map(|source| source.id)
        .collect();

    if due.is_empty() {
        tracing::debug!("No sources due for crawling");
        return Ok(sweep_payload(0, Vec::new()));
    }

    tracing::info!(sources = due.len(), "Scheduling due crawls");
    batch_crawl(pipeline, &due)
}
