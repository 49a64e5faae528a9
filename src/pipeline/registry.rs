//! Task status registry
//!
//! Every dispatched task gets a `TaskRecord` that moves from `queued` to
//! `running` to `succeeded` or `failed`. The registry is an injected service
//! shared by the router, the workers and the task bodies; each task only
//! writes its own record.

use crate::pipeline::message::TaskMessage;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Errors raised by the task registry
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Task not found: {0}")]
    NotFound(String),
}

/// Lifecycle of a dispatched task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status and outcome of one task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: String,
    pub task: String,
    pub status: TaskStatus,
    pub source_id: Option<String>,
    pub articles_found: usize,
    pub articles_processed: usize,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    /// Full error chain or panic message of a failed task
    pub trace: Option<String>,
    pub result: Option<Value>,
    pub deliveries: u32,
}

impl TaskRecord {
    /// A fresh record for a message that was just dispatched
    pub fn queued(message: &TaskMessage) -> Self {
        Self {
            task_id: message.id.clone(),
            task: message.task.clone(),
            status: TaskStatus::Queued,
            source_id: None,
            articles_found: 0,
            articles_processed: 0,
            created_at: message.created_at,
            started_at: None,
            completed_at: None,
            error: None,
            trace: None,
            result: None,
            deliveries: message.deliveries,
        }
    }

    pub fn mark_running(&mut self, deliveries: u32) {
        self.status = TaskStatus::Running;
        self.started_at = Some(Utc::now());
        self.deliveries = deliveries;
    }

    pub fn mark_succeeded(&mut self, result: Value) {
        self.status = TaskStatus::Succeeded;
        self.completed_at = Some(Utc::now());
        self.error = None;
        self.trace = None;
        self.result = Some(result);
    }

    pub fn mark_failed(&mut self, error: String, trace: String) {
        self.status = TaskStatus::Failed;
        self.completed_at = Some(Utc::now());
        self.error = Some(error);
        self.trace = Some(trace);
    }
}

/// Criteria for listing task records
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub task: Option<String>,
    pub source_id: Option<String>,
    pub limit: Option<usize>,
}

impl TaskFilter {
    fn matches(&self, record: &TaskRecord) -> bool {
        self.status.map_or(true, |s| record.status == s)
            && self.task.as_deref().map_or(true, |t| record.task == t)
            && self
                .source_id
                .as_deref()
                .map_or(true, |id| record.source_id.as_deref() == Some(id))
    }
}

/// Store of task records keyed by task id
pub trait TaskRegistry: Send + Sync {
    /// Inserts or replaces a record
    fn put(&self, record: TaskRecord);

    fn get(&self, task_id: &str) -> Result<TaskRecord, RegistryError>;

    /// Records matching the filter, newest first
    fn list(&self, filter: &TaskFilter) -> Vec<TaskRecord>;

    /// Applies `change` to an existing record in place
    fn update(
        &self,
        task_id: &str,
        change: &mut dyn FnMut(&mut TaskRecord),
    ) -> Result<(), RegistryError>;
}

/// Task registry held in process memory
#[derive(Debug, Default)]
pub struct InMemoryTaskRegistry {
    records: DashMap<String, TaskRecord>,
}

impl InMemoryTaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl TaskRegistry for InMemoryTaskRegistry {
    fn put(&self, record: TaskRecord) {
        self.records.insert(record.task_id.clone(), record);
    }

    fn get(&self, task_id: &str) -> Result<TaskRecord, RegistryError> {
        self.records
            .get(task_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| RegistryError::NotFound(task_id.to_string()))
    }

    fn list(&self, filter: &TaskFilter) -> Vec<TaskRecord> {
        let mut records: Vec<TaskRecord> = self
            .records
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();

        records.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.task_id.cmp(&b.task_id))
        });
        if let Some(limit) = filter.limit {
            records.truncate(limit);
        }
        records
    }

    fn update(
        &self,
        task_id: &str,
        change: &mut dyn FnMut(&mut TaskRecord),
    ) -> Result<(), RegistryError> {
        let mut entry = self
            .records
            .get_mut(task_id)
            .ok_or_else(|| RegistryError::NotFound(task_id.to_string()))?;
        change(entry.value_mut());
        Ok(())
    }
}
