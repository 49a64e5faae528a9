//! Index stage

use super::{dispatch_batches, sweep_payload, update_record, BatchReport, ItemStatus, Task, TaskError};
use crate::pipeline::context::TaskContext;
use crate::pipeline::Pipeline;
use crate::storage::{ArticleStatus, IndexDocument, StorageError, Store};
use chrono::Utc;
use serde_json::{json, Value};

/// Builds and stores the index document of one article
///
/// Duplicates are skipped; articles not yet processed fail.
pub fn index_article(store: &dyn Store, article_id: &str) -> Result<ItemStatus, TaskError> {
    let stored = store
        .get_article(article_id)?
        .ok_or_else(|| StorageError::ArticleNotFound(article_id.to_string()))?;

    match stored.status {
        ArticleStatus::Duplicate => {
            tracing::debug!(article_id, "Skipping duplicate article");
            return Ok(ItemStatus::Skipped);
        }
        ArticleStatus::Pending => return Err(TaskError::NotProcessed(article_id.to_string())),
        ArticleStatus::Processed | ArticleStatus::Indexed => {}
    }

    let document = IndexDocument::from_article(&stored, Utc::now())
        .ok_or_else(|| TaskError::NotProcessed(article_id.to_string()))?;
    store.index_document(&document)?;
    store.set_status(article_id, ArticleStatus::Indexed)?;

    tracing::debug!(article_id, "Indexed article");
    Ok(ItemStatus::Indexed)
}

fn index_all(store: &dyn Store, article_ids: &[String]) -> BatchReport {
    let mut report = BatchReport::default();
    for article_id in article_ids {
        report.record(article_id, index_article(store, article_id));
    }
    report
}

/// Indexes a batch of articles, each independently
pub fn index_news(
    pipeline: &Pipeline,
    ctx: &TaskContext,
    article_ids: &[String],
) -> Result<Value, TaskError> {
    let report = index_all(pipeline.store(), article_ids);

    update_record(pipeline, ctx, |record| {
        record.articles_found = report.total;
        record.articles_processed = report.succeeded;
    });

    tracing::info!(
        total = report.total,
        succeeded = report.succeeded,
        failed = report.failed,
        "Index batch finished"
    );
    Ok(serde_json::to_value(&report)?)
}

/// Dispatches index tasks for every processed article not yet indexed
pub fn schedule_index(pipeline: &Pipeline) -> Result<Value, TaskError> {
    let processed: Vec<String> = pipeline
        .store()
        .list_by_status(ArticleStatus::Processed, usize::MAX)?
        .into_iter()
        .map(|article| article.id)
        .collect();

    if processed.is_empty() {
        tracing::debug!("No articles waiting for indexing");
        return Ok(sweep_payload(0, Vec::new()));
    }

    let task_ids = dispatch_batches(pipeline, &processed, |article_ids| Task::IndexNews {
        article_ids,
    })?;
    tracing::info!(articles = processed.len(), tasks = task_ids.len(), "Scheduled indexing");
    Ok(sweep_payload(processed.len(), task_ids))
}

/// Clears the search index and re-indexes every processed or indexed article
pub fn rebuild_index(pipeline: &Pipeline) -> Result<Value, TaskError> {
    let store = pipeline.store();
    let cleared = store.clear_index()?;

    let mut article_ids = Vec::new();
    for status in [ArticleStatus::Processed, ArticleStatus::Indexed] {
        article_ids.extend(
            store
                .list_by_status(status, usize::MAX)?
                .into_iter()
                .map(|article| article.id),
        );
    }

    let report = index_all(store, &article_ids);
    tracing::info!(
        cleared,
        indexed = report.succeeded,
        failed = report.failed,
        "Rebuilt search index"
    );

    Ok(json!({
        "cleared": cleared,
        "indexed": report.succeeded,
        "failed": report.failed,
        "results": report.results,
    }))
}

/// Reconciles the search index with the article store
///
/// Documents of missing, pending or duplicate articles are removed, documents
/// of articles sent back to `processed` are rebuilt, and indexed articles
/// without a document are indexed again.
pub fn sync_database(pipeline: &Pipeline) -> Result<Value, TaskError> {
    let store = pipeline.store();
    let (mut deleted, mut updated, mut synced) = (0usize, 0usize, 0usize);

    for id in store.document_ids()? {
        let status = store.get_article(&id)?.map(|article| article.status);
        match status {
            None | Some(ArticleStatus::Pending) | Some(ArticleStatus::Duplicate) => {
                store.remove_document(&id)?;
                tracing::debug!(article_id = %id, "Removed stale index document");
                deleted += 1;
            }
            Some(ArticleStatus::Processed) => {
                index_article(store, &id)?;
                updated += 1;
            }
            Some(ArticleStatus::Indexed) => {}
        }
    }

    for stored in store.list_by_status(ArticleStatus::Indexed, usize::MAX)? {
        if store.get_document(&stored.id)?.is_none() {
            index_article(store, &stored.id)?;
            synced += 1;
        }
    }

    tracing::info!(synced, updated, deleted, "Synchronized search index");
    Ok(json!({
        "articles_synced": synced,
        "articles_updated": updated,
        "articles_deleted": deleted,
    }))
}
