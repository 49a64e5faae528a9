//! Task dispatch
//!
//! The router is the single entry point for starting work: it assigns the
//! task id, records the task as queued and publishes it to the queue its
//! name routes to.

use crate::pipeline::broker::{Broker, BrokerError};
use crate::pipeline::message::{QueueName, TaskMessage};
use crate::pipeline::registry::{TaskRecord, TaskRegistry};
use crate::pipeline::tasks::Task;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Dispatches tasks to their queues
#[derive(Clone)]
pub struct TaskRouter {
    broker: Arc<dyn Broker>,
    registry: Arc<dyn TaskRegistry>,
}

impl TaskRouter {
    pub fn new(broker: Arc<dyn Broker>, registry: Arc<dyn TaskRegistry>) -> Self {
        Self { broker, registry }
    }

    /// Queue a task name is bound to
    pub fn route(task: &str) -> QueueName {
        QueueName::for_task(task)
    }

    /// Dispatches a task by name
    ///
    /// # Arguments
    ///
    /// * `task` - Task name, e.g. `crawler.start_crawler_task`
    /// * `args` - Positional arguments
    /// * `kwargs` - Keyword arguments
    ///
    /// # Returns
    ///
    /// * `Ok(String)` - The new task id; the task has not run yet
    /// * `Err(BrokerError)` - The message could not be published; the record
    ///   is marked failed
    pub fn dispatch(
        &self,
        task: &str,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    ) -> Result<String, BrokerError> {
        let message = TaskMessage::new(task, args, kwargs);
        let task_id = message.id.clone();
        let queue = message.routing_key;

        self.registry.put(TaskRecord::queued(&message));

        if let Err(e) = self.broker.publish(message) {
            let error = e.to_string();
            let _ = self.registry.update(&task_id, &mut |record| {
                record.mark_failed(format!("Dispatch failed: {}", error), error.clone())
            });
            return Err(e);
        }

        tracing::debug!(%task_id, task, %queue, "Dispatched task");
        Ok(task_id)
    }

    /// Dispatches a typed task
    pub fn dispatch_task(&self, task: &Task) -> Result<String, BrokerError> {
        self.dispatch(task.name(), task.to_args(), Map::new())
    }
}
