//! Pipeline stage task bodies
//!
//! Tasks are addressed by name on the wire and parsed into a typed `Task`
//! before running. Every body is idempotent: ids are deterministic and every
//! write is an upsert, so a redelivered message repeats the same work
//! without creating duplicates.

mod crawl;
mod index;
mod process;

pub use crawl::{batch_crawl, schedule_crawl, start_crawl};
pub use index::{index_article, index_news, rebuild_index, schedule_index, sync_database};
pub use process::{
    analyze_sentiment, cleanup_duplicates, process_article, process_news, rescore_sentiment,
    schedule_process,
};

use crate::pipeline::broker::BrokerError;
use crate::pipeline::context::TaskContext;
use crate::pipeline::message::TaskMessage;
use crate::pipeline::registry::TaskRecord;
use crate::pipeline::Pipeline;
use crate::storage::StorageError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

pub const START_CRAWLER_TASK: &str = "crawler.start_crawler_task";
pub const BATCH_CRAWLER_TASK: &str = "crawler.batch_crawler_task";
pub const SCHEDULE_CRAWLER_TASK: &str = "crawler.schedule_crawler_task";
pub const PROCESS_NEWS_TASK: &str = "processor.process_news_task";
pub const SCHEDULE_PROCESSOR_TASK: &str = "processor.schedule_processor_task";
pub const CLEANUP_DUPLICATES_TASK: &str = "processor.cleanup_duplicates_task";
pub const ANALYZE_SENTIMENT_TASK: &str = "processor.analyze_sentiment_task";
pub const INDEX_NEWS_TASK: &str = "index.index_news_task";
pub const SCHEDULE_INDEX_TASK: &str = "index.schedule_index_task";
pub const REBUILD_INDEX_TASK: &str = "index.rebuild_index_task";
pub const SYNC_DATABASE_TASK: &str = "index.sync_database_task";

/// Errors that escape a task body and fail the task
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Unknown task: {0}")]
    UnknownTask(String),

    #[error("Invalid arguments for {task}: {reason}")]
    InvalidArguments { task: String, reason: String },

    #[error("Crawl of source '{source_id}' could not start: {reason}")]
    Crawl { source_id: String, reason: String },

    #[error("Article {0} has not been processed")]
    NotProcessed(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Dispatch error: {0}")]
    Broker(#[from] BrokerError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A task of the pipeline catalogue with its arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    StartCrawl {
        source_id: String,
        max_pages: Option<u32>,
        force: bool,
    },
    BatchCrawl {
        source_ids: Vec<String>,
    },
    ScheduleCrawl,
    ProcessNews {
        article_ids: Vec<String>,
    },
    ScheduleProcess,
    CleanupDuplicates,
    AnalyzeSentiment {
        article_ids: Vec<String>,
    },
    IndexNews {
        article_ids: Vec<String>,
    },
    ScheduleIndex,
    RebuildIndex,
    SyncDatabase,
}

impl Task {
    pub fn name(&self) -> &'static str {
        match self {
            Self::StartCrawl { .. } => START_CRAWLER_TASK,
            Self::BatchCrawl { .. } => BATCH_CRAWLER_TASK,
            Self::ScheduleCrawl => SCHEDULE_CRAWLER_TASK,
            Self::ProcessNews { .. } => PROCESS_NEWS_TASK,
            Self::ScheduleProcess => SCHEDULE_PROCESSOR_TASK,
            Self::CleanupDuplicates => CLEANUP_DUPLICATES_TASK,
            Self::AnalyzeSentiment { .. } => ANALYZE_SENTIMENT_TASK,
            Self::IndexNews { .. } => INDEX_NEWS_TASK,
            Self::ScheduleIndex => SCHEDULE_INDEX_TASK,
            Self::RebuildIndex => REBUILD_INDEX_TASK,
            Self::SyncDatabase => SYNC_DATABASE_TASK,
        }
    }

    /// Positional arguments in the order `from_message` reads them
    pub fn to_args(&self) -> Vec<Value> {
        match self {
            Self::StartCrawl {
                source_id,
                max_pages,
                force,
            } => vec![json!(source_id), json!(max_pages), json!(force)],
            Self::BatchCrawl { source_ids } => vec![json!(source_ids)],
            Self::ProcessNews { article_ids }
            | Self::AnalyzeSentiment { article_ids }
            | Self::IndexNews { article_ids } => vec![json!(article_ids)],
            Self::ScheduleCrawl
            | Self::ScheduleProcess
            | Self::CleanupDuplicates
            | Self::ScheduleIndex
            | Self::RebuildIndex
            | Self::SyncDatabase => Vec::new(),
        }
    }

    /// Parses a message into a task
    ///
    /// Arguments may be positional or keyword; positional wins.
    pub fn from_message(message: &TaskMessage) -> Result<Self, TaskError> {
        let task = match message.task.as_str() {
            START_CRAWLER_TASK => Self::StartCrawl {
                source_id: required(message, 0, "source_id")?,
                max_pages: optional(message, 1, "max_pages")?,
                force: optional(message, 2, "force")?.unwrap_or(false),
            },
            BATCH_CRAWLER_TASK => Self::BatchCrawl {
                source_ids: required(message, 0, "source_ids")?,
            },
            SCHEDULE_CRAWLER_TASK => Self::ScheduleCrawl,
            PROCESS_NEWS_TASK => Self::ProcessNews {
                article_ids: required(message, 0, "article_ids")?,
            },
            SCHEDULE_PROCESSOR_TASK => Self::ScheduleProcess,
            CLEANUP_DUPLICATES_TASK => Self::CleanupDuplicates,
            ANALYZE_SENTIMENT_TASK => Self::AnalyzeSentiment {
                article_ids: required(message, 0, "article_ids")?,
            },
            INDEX_NEWS_TASK => Self::IndexNews {
                article_ids: required(message, 0, "article_ids")?,
            },
            SCHEDULE_INDEX_TASK => Self::ScheduleIndex,
            REBUILD_INDEX_TASK => Self::RebuildIndex,
            SYNC_DATABASE_TASK => Self::SyncDatabase,
            other => return Err(TaskError::UnknownTask(other.to_string())),
        };
        Ok(task)
    }
}

fn optional<T: serde::de::DeserializeOwned>(
    message: &TaskMessage,
    index: usize,
    key: &str,
) -> Result<Option<T>, TaskError> {
    message
        .arg(index, key)
        .map(|value| {
            serde_json::from_value(value.clone()).map_err(|e| TaskError::InvalidArguments {
                task: message.task.clone(),
                reason: format!("{}: {}", key, e),
            })
        })
        .transpose()
}

fn required<T: serde::de::DeserializeOwned>(
    message: &TaskMessage,
    index: usize,
    key: &str,
) -> Result<T, TaskError> {
    optional(message, index, key)?.ok_or_else(|| TaskError::InvalidArguments {
        task: message.task.clone(),
        reason: format!("missing argument '{}'", key),
    })
}

/// Runs a task body
///
/// Per-item failures are part of the returned payload; only errors that
/// prevent the body from running at all come back as `Err`.
pub async fn run(pipeline: &Pipeline, ctx: &TaskContext, task: Task) -> Result<Value, TaskError> {
    match task {
        Task::StartCrawl {
            source_id,
            max_pages,
            force,
        } => start_crawl(pipeline, ctx, &source_id, max_pages, force).await,
        Task::BatchCrawl { source_ids } => batch_crawl(pipeline, &source_ids),
        Task::ScheduleCrawl => schedule_crawl(pipeline),
        Task::ProcessNews { article_ids } => process_news(pipeline, ctx, &article_ids),
        Task::ScheduleProcess => schedule_process(pipeline),
        Task::CleanupDuplicates => cleanup_duplicates(pipeline),
        Task::AnalyzeSentiment { article_ids } => analyze_sentiment(pipeline, ctx, &article_ids),
        Task::IndexNews { article_ids } => index_news(pipeline, ctx, &article_ids),
        Task::ScheduleIndex => schedule_index(pipeline),
        Task::RebuildIndex => rebuild_index(pipeline),
        Task::SyncDatabase => sync_database(pipeline),
    }
}

/// Outcome of one item of a batch task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Processed,
    Duplicate,
    /// Sentiment rescored
    Analyzed,
    Indexed,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemOutcome {
    pub article_id: String,
    pub status: ItemStatus,
    pub error: Option<String>,
}

/// Payload of the process and index tasks
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub results: Vec<ItemOutcome>,
}

impl BatchReport {
    fn record(&mut self, article_id: &str, outcome: Result<ItemStatus, TaskError>) {
        self.total += 1;
        let item = match outcome {
            Ok(status) => {
                self.succeeded += 1;
                ItemOutcome {
                    article_id: article_id.to_string(),
                    status,
                    error: None,
                }
            }
            Err(e) => {
                tracing::warn!(article_id, error = %e, "Item failed");
                self.failed += 1;
                ItemOutcome {
                    article_id: article_id.to_string(),
                    status: ItemStatus::Failed,
                    error: Some(e.to_string()),
                }
            }
        };
        self.results.push(item);
    }

    /// Ids of items that ended in `status`
    pub fn ids_with(&self, status: ItemStatus) -> Vec<String> {
        self.results
            .iter()
            .filter(|item| item.status == status)
            .map(|item| item.article_id.clone())
            .collect()
    }
}

/// Dispatches `build(chunk)` for each chunk of `ids`, returning the task ids
fn dispatch_batches(
    pipeline: &Pipeline,
    ids: &[String],
    build: impl Fn(Vec<String>) -> Task,
) -> Result<Vec<String>, TaskError> {
    let batch_size = pipeline.config().pipeline.batch_size.max(1);
    ids.chunks(batch_size)
        .map(|chunk| {
            pipeline
                .router()
                .dispatch_task(&build(chunk.to_vec()))
                .map_err(TaskError::from)
        })
        .collect()
}

/// Applies `change` to the running task's record, if it has one
fn update_record(pipeline: &Pipeline, ctx: &TaskContext, mut change: impl FnMut(&mut TaskRecord)) {
    if let Err(e) = pipeline.registry().update(&ctx.task_id, &mut change) {
        tracing::debug!(task_id = %ctx.task_id, error = %e, "No task record to update");
    }
}

fn sweep_payload(eligible: usize, task_ids: Vec<String>) -> Value {
    json!({
        "eligible": eligible,
        "dispatched": task_ids.len(),
        "task_ids": task_ids,
    })
}
