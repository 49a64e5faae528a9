//! Process stage

use super::{dispatch_batches, sweep_payload, update_record, BatchReport, ItemStatus, Task, TaskError};
use crate::pipeline::context::TaskContext;
use crate::pipeline::Pipeline;
use crate::processing::{analyze, score_sentiment};
use crate::storage::{ArticleStatus, IndexDocument, StorageError, Store};
use chrono::Utc;
use serde_json::{json, Value};

/// Analyzes one stored article and saves the result
///
/// The article becomes `duplicate` when another stored article with the same
/// fingerprint has a smaller id, `processed` otherwise. Every stored article
/// carries its fingerprint from the moment it is upserted, so the outcome
/// does not depend on which of the two is processed first. A duplicate loses
/// any index document it had. Running this twice on the same article yields
/// the same status and analysis.
pub fn process_article(store: &dyn Store, article_id: &str) -> Result<ItemStatus, TaskError> {
    let stored = store
        .get_article(article_id)?
        .ok_or_else(|| StorageError::ArticleNotFound(article_id.to_string()))?;

    let mut analysis = analyze(&stored.article);
    let original = store
        .find_by_fingerprint(&analysis.fingerprint)?
        .into_iter()
        .find(|other| other.as_str() < article_id);

    let (status, item) = match original {
        Some(original) => {
            tracing::debug!(article_id, duplicate_of = %original, "Duplicate article");
            analysis.duplicate_of = Some(original);
            (ArticleStatus::Duplicate, ItemStatus::Duplicate)
        }
        None => (ArticleStatus::Processed, ItemStatus::Processed),
    };

    store.save_analysis(article_id, &analysis, status)?;
    if status == ArticleStatus::Duplicate && store.remove_document(article_id)? {
        tracing::info!(article_id, "Removed index document of duplicate article");
    }
    tracing::debug!(
        article_id,
        category = %analysis.category,
        sentiment = %analysis.sentiment_label,
        "Processed article"
    );
    Ok(item)
}

/// Processes a batch of articles, each independently
pub fn process_news(
    pipeline: &Pipeline,
    ctx: &TaskContext,
    article_ids: &[String],
) -> Result<Value, TaskError> {
    let mut report = BatchReport::default();
    for article_id in article_ids {
        report.record(article_id, process_article(pipeline.store(), article_id));
    }

    update_record(pipeline, ctx, |record| {
        record.articles_found = report.total;
        record.articles_processed = report.succeeded;
    });

    tracing::info!(
        total = report.total,
        succeeded = report.succeeded,
        failed = report.failed,
        "Process batch finished"
    );

    let processed = report.ids_with(ItemStatus::Processed);
    if pipeline.config().pipeline.chain_stages && !processed.is_empty() {
        dispatch_batches(pipeline, &processed, |article_ids| Task::IndexNews { article_ids })?;
    }

    Ok(serde_json::to_value(&report)?)
}

/// Dispatches process tasks for every pending article
pub fn schedule_process(pipeline: &Pipeline) -> Result<Value, TaskError> {
    let pending: Vec<String> = pipeline
        .store()
        .list_by_status(ArticleStatus::Pending, usize::MAX)?
        .into_iter()
        .map(|article| article.id)
        .collect();

    if pending.is_empty() {
        tracing::debug!("No pending articles");
        return Ok(sweep_payload(0, Vec::new()));
    }

    let task_ids = dispatch_batches(pipeline, &pending, |article_ids| Task::ProcessNews {
        article_ids,
    })?;
    tracing::info!(articles = pending.len(), tasks = task_ids.len(), "Scheduled processing");
    Ok(sweep_payload(pending.len(), task_ids))
}

/// Re-checks every analyzed article against the fingerprints in the store
///
/// Articles repeating one with a smaller id are marked `duplicate` and lose
/// their index document. Duplicates whose original is gone are restored to
/// `processed`.
pub fn cleanup_duplicates(pipeline: &Pipeline) -> Result<Value, TaskError> {
    let store = pipeline.store();
    let mut articles = Vec::new();
    for status in [
        ArticleStatus::Processed,
        ArticleStatus::Indexed,
        ArticleStatus::Duplicate,
    ] {
        articles.extend(store.list_by_status(status, usize::MAX)?);
    }
    articles.sort_by(|a, b| a.id.cmp(&b.id));

    let (mut found, mut marked, mut documents_removed, mut restored) = (0usize, 0usize, 0usize, 0usize);
    for stored in articles {
        let Some(mut analysis) = stored.analysis else {
            continue;
        };
        let original = store
            .find_by_fingerprint(&stored.fingerprint)?
            .into_iter()
            .next()
            .filter(|first| first.as_str() < stored.id.as_str());

        match original {
            Some(original) => {
                found += 1;
                if stored.status != ArticleStatus::Duplicate
                    || analysis.duplicate_of.as_deref() != Some(original.as_str())
                {
                    tracing::debug!(article_id = %stored.id, duplicate_of = %original, "Marking duplicate");
                    analysis.duplicate_of = Some(original);
                    store.save_analysis(&stored.id, &analysis, ArticleStatus::Duplicate)?;
                    marked += 1;
                }
                if store.remove_document(&stored.id)? {
                    documents_removed += 1;
                }
            }
            None if stored.status == ArticleStatus::Duplicate => {
                tracing::debug!(article_id = %stored.id, "Original gone, restoring article");
                analysis.duplicate_of = None;
                store.save_analysis(&stored.id, &analysis, ArticleStatus::Processed)?;
                restored += 1;
            }
            None => {}
        }
    }

    tracing::info!(found, marked, documents_removed, restored, "Duplicate cleanup finished");
    Ok(json!({
        "duplicates_found": found,
        "marked": marked,
        "documents_removed": documents_removed,
        "restored": restored,
    }))
}

/// Recomputes the sentiment of one analyzed article, leaving the rest as is
///
/// Indexed articles get their document rebuilt with the new score.
pub fn rescore_sentiment(store: &dyn Store, article_id: &str) -> Result<ItemStatus, TaskError> {
    let stored = store
        .get_article(article_id)?
        .ok_or_else(|| StorageError::ArticleNotFound(article_id.to_string()))?;
    let mut analysis = stored
        .analysis
        .clone()
        .ok_or_else(|| TaskError::NotProcessed(article_id.to_string()))?;

    let text = format!("{} {}", stored.article.title, analysis.cleaned_content);
    let (score, label) = score_sentiment(&text);
    analysis.sentiment_score = score;
    analysis.sentiment_label = label;
    store.save_analysis(article_id, &analysis, stored.status)?;

    if stored.status == ArticleStatus::Indexed {
        let refreshed = store
            .get_article(article_id)?
            .ok_or_else(|| StorageError::ArticleNotFound(article_id.to_string()))?;
        if let Some(document) = IndexDocument::from_article(&refreshed, Utc::now()) {
            store.index_document(&document)?;
        }
    }

    tracing::debug!(article_id, sentiment = %label, "Rescored sentiment");
    Ok(ItemStatus::Analyzed)
}

/// Rescores the sentiment of a batch of articles, each independently
pub fn analyze_sentiment(
    pipeline: &Pipeline,
    ctx: &TaskContext,
    article_ids: &[String],
) -> Result<Value, TaskError> {
    let mut report = BatchReport::default();
    for article_id in article_ids {
        report.record(article_id, rescore_sentiment(pipeline.store(), article_id));
    }

    update_record(pipeline, ctx, |record| {
        record.articles_found = report.total;
        record.articles_processed = report.succeeded;
    });

    tracing::info!(
        total = report.total,
        succeeded = report.succeeded,
        failed = report.failed,
        "Sentiment batch finished"
    );
    Ok(serde_json::to_value(&report)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::pipeline::message::QueueName;
    use crate::pipeline::tasks::index_article;
    use crate::plugins::ExtractedArticle;
    use crate::processing::SentimentLabel;
    use crate::storage::article_id;

    fn article(url: &str, title: &str, content: &str) -> ExtractedArticle {
        ExtractedArticle {
            title: title.to_string(),
            content: content.to_string(),
            url: url.to_string(),
            author: None,
            publish_time: None,
            category: None,
            source_id: "s1".to_string(),
            source_name: "Source".to_string(),
            extracted_at: Utc::now(),
        }
    }

    fn ctx() -> TaskContext {
        TaskContext {
            task_id: "t".to_string(),
            retries: 0,
            queue: QueueName::Processor,
        }
    }

    fn pipeline(chain: bool) -> Pipeline {
        let mut config = Config::default();
        config.pipeline.chain_stages = chain;
        Pipeline::in_memory(config)
    }

    #[test]
    fn test_process_is_idempotent() {
        let pipeline = pipeline(false);
        let id = pipeline
            .store()
            .upsert_article(&article(
                "https://example.com/a1",
                "Chip output doubles",
                "Chip makers report strong growth.",
            ))
            .unwrap();

        assert_eq!(process_article(pipeline.store(), &id).unwrap(), ItemStatus::Processed);
        let first = pipeline.store().get_article(&id).unwrap().unwrap();

        assert_eq!(process_article(pipeline.store(), &id).unwrap(), ItemStatus::Processed);
        let second = pipeline.store().get_article(&id).unwrap().unwrap();

        assert_eq!(first.status, ArticleStatus::Processed);
        assert_eq!(second.status, first.status);
        let (a, b) = (first.analysis.unwrap(), second.analysis.unwrap());
        assert_eq!(a.fingerprint, b.fingerprint);
        assert_eq!(a.keywords, b.keywords);
        assert_eq!(a.category, b.category);
        assert_eq!(a.sentiment_score, b.sentiment_score);
    }

    #[test]
    fn test_duplicate_detected_against_smaller_id() {
        let pipeline = pipeline(false);
        let store = pipeline.store();
        let a = store
            .upsert_article(&article("https://example.com/a", "Same story", "Same body"))
            .unwrap();
        let b = store
            .upsert_article(&article("https://example.com/b", "Same story", "Same body"))
            .unwrap();
        let (first, second) = if a < b { (a, b) } else { (b, a) };

        assert_eq!(process_article(store, &first).unwrap(), ItemStatus::Processed);
        assert_eq!(process_article(store, &second).unwrap(), ItemStatus::Duplicate);

        let dup = store.get_article(&second).unwrap().unwrap();
        assert_eq!(dup.status, ArticleStatus::Duplicate);
        assert_eq!(dup.analysis.unwrap().duplicate_of, Some(first.clone()));

        // re-running keeps the original unmarked
        assert_eq!(process_article(store, &first).unwrap(), ItemStatus::Processed);
    }

    #[test]
    fn test_duplicate_detected_when_larger_id_runs_first() {
        let pipeline = pipeline(false);
        let store = pipeline.store();
        let a = store
            .upsert_article(&article("https://example.com/a", "Same story", "Same body"))
            .unwrap();
        let b = store
            .upsert_article(&article("https://example.com/b", "Same story", "Same body"))
            .unwrap();
        let (small, large) = if a < b { (a, b) } else { (b, a) };

        // the original is still pending when its repeat is analyzed
        assert_eq!(process_article(store, &large).unwrap(), ItemStatus::Duplicate);
        assert_eq!(process_article(store, &small).unwrap(), ItemStatus::Processed);

        let repeat = store.get_article(&large).unwrap().unwrap();
        assert_eq!(repeat.status, ArticleStatus::Duplicate);
        assert_eq!(repeat.analysis.unwrap().duplicate_of, Some(small.clone()));
        assert_eq!(
            store.get_article(&small).unwrap().unwrap().status,
            ArticleStatus::Processed
        );
    }

    #[test]
    fn test_indexed_article_loses_document_when_original_arrives() {
        let pipeline = pipeline(false);
        let store = pipeline.store();
        let a_url = "https://example.com/a";
        let b_url = "https://example.com/b";
        let (a, b) = (article_id(a_url), article_id(b_url));
        let (first_url, late_url) = if a > b { (a_url, b_url) } else { (b_url, a_url) };

        // the larger id is processed and indexed on its own
        let larger = store
            .upsert_article(&article(first_url, "Same story", "Same body"))
            .unwrap();
        process_article(store, &larger).unwrap();
        index_article(store, &larger).unwrap();
        assert!(store.get_document(&larger).unwrap().is_some());

        // a later crawl stores the same story under a smaller id
        let smaller = store
            .upsert_article(&article(late_url, "Same story", "Same body"))
            .unwrap();
        assert!(smaller < larger);

        assert_eq!(process_article(store, &larger).unwrap(), ItemStatus::Duplicate);
        assert!(store.get_document(&larger).unwrap().is_none());
        assert_eq!(process_article(store, &smaller).unwrap(), ItemStatus::Processed);
    }

    #[test]
    fn test_cleanup_marks_missed_duplicates() {
        let pipeline = pipeline(false);
        let store = pipeline.store();
        let a_url = "https://example.com/a";
        let b_url = "https://example.com/b";
        let (a, b) = (article_id(a_url), article_id(b_url));
        let (first_url, late_url) = if a > b { (a_url, b_url) } else { (b_url, a_url) };

        let larger = store
            .upsert_article(&article(first_url, "Same story", "Same body"))
            .unwrap();
        process_article(store, &larger).unwrap();
        index_article(store, &larger).unwrap();
        let smaller = store
            .upsert_article(&article(late_url, "Same story", "Same body"))
            .unwrap();
        process_article(store, &smaller).unwrap();

        let payload = cleanup_duplicates(&pipeline).unwrap();
        assert_eq!(payload["duplicates_found"], 1);
        assert_eq!(payload["marked"], 1);
        assert_eq!(payload["documents_removed"], 1);

        let dup = store.get_article(&larger).unwrap().unwrap();
        assert_eq!(dup.status, ArticleStatus::Duplicate);
        assert_eq!(dup.analysis.unwrap().duplicate_of, Some(smaller.clone()));
        assert!(store.get_document(&larger).unwrap().is_none());

        // a second sweep finds the same duplicate but changes nothing
        let payload = cleanup_duplicates(&pipeline).unwrap();
        assert_eq!(payload["duplicates_found"], 1);
        assert_eq!(payload["marked"], 0);
        assert_eq!(payload["documents_removed"], 0);
    }

    #[test]
    fn test_cleanup_restores_duplicate_when_original_changes() {
        let pipeline = pipeline(false);
        let store = pipeline.store();
        let a = store
            .upsert_article(&article("https://example.com/a", "Same story", "Same body"))
            .unwrap();
        let b = store
            .upsert_article(&article("https://example.com/b", "Same story", "Same body"))
            .unwrap();
        let (first, second, first_url) = if a < b {
            (a, b, "https://example.com/a")
        } else {
            (b, a, "https://example.com/b")
        };
        process_article(store, &first).unwrap();
        process_article(store, &second).unwrap();

        // the original is re-crawled with an updated story
        store
            .upsert_article(&article(first_url, "Same story", "Corrected body"))
            .unwrap();

        let payload = cleanup_duplicates(&pipeline).unwrap();
        assert_eq!(payload["duplicates_found"], 0);
        assert_eq!(payload["restored"], 1);

        let restored = store.get_article(&second).unwrap().unwrap();
        assert_eq!(restored.status, ArticleStatus::Processed);
        assert_eq!(restored.analysis.unwrap().duplicate_of, None);
    }

    #[test]
    fn test_analyze_sentiment_rescores_and_refreshes_document() {
        let pipeline = pipeline(false);
        let store = pipeline.store();
        let id = store
            .upsert_article(&article(
                "https://example.com/a1",
                "Exports rally",
                "Strong growth and record gains.",
            ))
            .unwrap();
        process_article(store, &id).unwrap();
        index_article(store, &id).unwrap();

        let expected = store.get_article(&id).unwrap().unwrap().analysis.unwrap();
        let mut stale = expected.clone();
        stale.sentiment_score = 0.0;
        stale.sentiment_label = SentimentLabel::Neutral;
        store.save_analysis(&id, &stale, ArticleStatus::Indexed).unwrap();

        let payload = analyze_sentiment(&pipeline, &ctx(), &[id.clone()]).unwrap();
        assert_eq!(payload["succeeded"], 1);
        assert_eq!(payload["results"][0]["status"], "analyzed");

        let stored = store.get_article(&id).unwrap().unwrap();
        assert_eq!(stored.status, ArticleStatus::Indexed);
        let analysis = stored.analysis.unwrap();
        assert_eq!(analysis.sentiment_label, SentimentLabel::Positive);
        assert_eq!(analysis.sentiment_score, expected.sentiment_score);
        assert_eq!(analysis.keywords, expected.keywords);

        let document = store.get_document(&id).unwrap().unwrap();
        assert_eq!(document.sentiment_label, SentimentLabel::Positive);
    }

    #[test]
    fn test_analyze_sentiment_requires_processed_article() {
        let pipeline = pipeline(false);
        let id = pipeline
            .store()
            .upsert_article(&article("https://example.com/a1", "Title", "Body"))
            .unwrap();

        let payload = analyze_sentiment(&pipeline, &ctx(), &[id]).unwrap();
        assert_eq!(payload["failed"], 1);
        assert!(payload["results"][0]["error"]
            .as_str()
            .unwrap()
            .contains("has not been processed"));
    }

    #[test]
    fn test_batch_reports_missing_articles() {
        let pipeline = pipeline(false);
        let id = pipeline
            .store()
            .upsert_article(&article("https://example.com/a1", "Title", "Body"))
            .unwrap();

        let payload = process_news(&pipeline, &ctx(), &[id.clone(), "missing".to_string()]).unwrap();
        let report: BatchReport = serde_json::from_value(payload).unwrap();
        assert_eq!(report.total, 2);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.results[1].status, ItemStatus::Failed);
        assert!(report.results[1].error.as_deref().unwrap().contains("missing"));
    }

    #[test]
    fn test_chains_index_task_for_processed_articles() {
        let pipeline = pipeline(true);
        let id = pipeline
            .store()
            .upsert_article(&article("https://example.com/a1", "Title", "Body"))
            .unwrap();

        process_news(&pipeline, &ctx(), &[id]).unwrap();
        assert_eq!(pipeline.broker().pending(QueueName::Index), 1);
    }

    #[test]
    fn test_schedule_batches_pending_articles() {
        let mut config = Config::default();
        config.pipeline.batch_size = 2;
        let pipeline = Pipeline::in_memory(config);
        for n in 0..5 {
            pipeline
                .store()
                .upsert_article(&article(&format!("https://example.com/{}", n), "T", "B"))
                .unwrap();
        }

        let payload = schedule_process(&pipeline).unwrap();
        assert_eq!(payload["eligible"], 5);
        assert_eq!(payload["dispatched"], 3);
        assert_eq!(pipeline.broker().pending(QueueName::Processor), 3);
    }

    #[test]
    fn test_schedule_without_pending_is_noop() {
        let pipeline = pipeline(true);
        let payload = schedule_process(&pipeline).unwrap();
        assert_eq!(payload["dispatched"], 0);
    }
}
