//! Task messages and the fixed queue topology

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

/// Named queues a task can be routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueName {
    Default,
    Crawler,
    Processor,
    Index,
}

impl QueueName {
    /// Every queue, in the order consumers are started
    pub const ALL: [QueueName; 4] = [
        QueueName::Crawler,
        QueueName::Processor,
        QueueName::Index,
        QueueName::Default,
    ];

    /// Queue bound to a task name
    ///
    /// Routing is by prefix: `crawler.*`, `processor.*` and `index.*` go to
    /// their stage queue, anything else to `default`.
    pub fn for_task(task: &str) -> Self {
        match task.split_once('.').map(|(prefix, _)| prefix) {
            Some("crawler") => Self::Crawler,
            Some("processor") => Self::Processor,
            Some("index") => Self::Index,
            _ => Self::Default,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Crawler => "crawler",
            Self::Processor => "processor",
            Self::Index => "index",
        }
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A dispatched task as it travels through the broker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMessage {
    /// UUID v4 assigned at dispatch
    pub id: String,
    pub task: String,
    pub args: Vec<Value>,
    pub kwargs: Map<String, Value>,
    pub routing_key: QueueName,
    pub created_at: DateTime<Utc>,
    /// Times the broker has handed this message to a consumer
    #[serde(default)]
    pub deliveries: u32,
}

impl TaskMessage {
    /// Creates a message with a fresh id, routed by task name
    pub fn new(task: &str, args: Vec<Value>, kwargs: Map<String, Value>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            task: task.to_string(),
            args,
            kwargs,
            routing_key: QueueName::for_task(task),
            created_at: Utc::now(),
            deliveries: 0,
        }
    }

    /// Argument at `index`, or the keyword argument `key` when absent
    ///
    /// JSON `null` counts as absent.
    pub fn arg(&self, index: usize, key: &str) -> Option<&Value> {
        self.args
            .get(index)
            .filter(|v| !v.is_null())
            .or_else(|| self.kwargs.get(key).filter(|v| !v.is_null()))
    }
}
