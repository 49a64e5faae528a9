//! Queue-routed processing pipeline
//!
//! This module moves work through the crawl, process and index stages:
//! - `TaskRouter` maps task names to queues and dispatches messages
//! - `Broker` carries messages from dispatch to the workers
//! - `TaskRegistry` records the status and outcome of every task
//! - `WorkerPool` consumes the queues and runs the task bodies
//! - the scheduler periodically dispatches the stage sweeps
//!
//! Delivery is at least once, so every task body is idempotent.

mod broker;
mod context;
mod message;
mod registry;
mod router;
mod scheduler;
pub mod tasks;
mod worker;

pub use broker::{Broker, BrokerError, Delivery, InMemoryBroker};
pub use context::TaskContext;
pub use message::{QueueName, TaskMessage};
pub use registry::{
    InMemoryTaskRegistry, RegistryError, TaskFilter, TaskRecord, TaskRegistry, TaskStatus,
};
pub use router::TaskRouter;
pub use scheduler::{spawn_scheduler, triggers, ScheduledTrigger};
pub use tasks::{Task, TaskError};
pub use worker::{error_trace, handle_delivery, WorkerPool};

use crate::config::Config;
use crate::plugins::PluginRegistry;
use crate::storage::{MemoryStore, StorageResult, Store};
use serde_json::Value;
use std::sync::Arc;

/// Services shared by every task body
pub struct Pipeline {
    config: Config,
    store: Arc<dyn Store>,
    broker: Arc<dyn Broker>,
    registry: Arc<dyn TaskRegistry>,
    router: TaskRouter,
    plugins: PluginRegistry,
}

impl Pipeline {
    /// Assembles a pipeline with the built-in plugins
    pub fn new(
        config: Config,
        store: Arc<dyn Store>,
        broker: Arc<dyn Broker>,
        registry: Arc<dyn TaskRegistry>,
    ) -> Self {
        let router = TaskRouter::new(Arc::clone(&broker), Arc::clone(&registry));
        Self {
            config,
            store,
            broker,
            registry,
            router,
            plugins: PluginRegistry::with_defaults(),
        }
    }

    /// A pipeline whose store, broker and registry all live in memory
    pub fn in_memory(config: Config) -> Self {
        Self::new(
            config,
            Arc::new(MemoryStore::new()),
            Arc::new(InMemoryBroker::new()),
            Arc::new(InMemoryTaskRegistry::new()),
        )
    }

    /// Replaces the plugin registry
    pub fn with_plugins(mut self, plugins: PluginRegistry) -> Self {
        self.plugins = plugins;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    pub fn broker(&self) -> &dyn Broker {
        self.broker.as_ref()
    }

    pub fn registry(&self) -> &dyn TaskRegistry {
        self.registry.as_ref()
    }

    pub fn router(&self) -> &TaskRouter {
        &self.router
    }

    pub fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }

    /// Upserts the configured sources into the source store
    ///
    /// Sources already stored keep their crawl history.
    pub fn seed_sources(&self) -> StorageResult<usize> {
        for entry in &self.config.sources {
            self.store.upsert_source(&entry.to_source())?;
        }
        tracing::info!(sources = self.config.sources.len(), "Seeded sources");
        Ok(self.config.sources.len())
    }

    /// Parses a message and runs its task body
    pub async fn execute(&self, ctx: &TaskContext, message: &TaskMessage) -> Result<Value, TaskError> {
        let task = Task::from_message(message)?;
        tasks::run(self, ctx, task).await
    }

    /// Runs queued tasks inline until every queue is empty
    ///
    /// Tasks dispatched while draining (chained stages) are run too. Returns
    /// the number of tasks handled.
    pub async fn drain(self: &Arc<Self>) -> Result<usize, BrokerError> {
        let mut handled = 0;
        loop {
            let mut idle = true;
            for queue in QueueName::ALL {
                while let Some(delivery) = self.broker.try_consume(queue)? {
                    handle_delivery(self, delivery).await;
                    handled += 1;
                    idle = false;
                }
            }
            if idle {
                return Ok(handled);
            }
        }
    }
}
