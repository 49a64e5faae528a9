//! Per-delivery task context

use crate::pipeline::message::{QueueName, TaskMessage};

/// Execution context handed to every task body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskContext {
    pub task_id: String,
    /// Redeliveries before this one; 0 on the first delivery
    pub retries: u32,
    pub queue: QueueName,
}

impl TaskContext {
    pub fn from_message(message: &TaskMessage) -> Self {
        Self {
            task_id: message.id.clone(),
            retries: message.deliveries.saturating_sub(1),
            queue: message.routing_key,
        }
    }
}
