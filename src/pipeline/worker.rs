//! Worker pool consuming the pipeline queues
//!
//! Each queue gets `concurrency` consumers. A global semaphore bounds how
//! many task bodies run at once across all queues. Messages are acknowledged
//! only after the body has finished and its outcome is recorded, so a worker
//! lost mid-task leaves the message unacknowledged for redelivery.

use crate::config::WorkerConfig;
use crate::pipeline::broker::Delivery;
use crate::pipeline::context::TaskContext;
use crate::pipeline::message::QueueName;
use crate::pipeline::registry::{TaskRecord, TaskStatus};
use crate::pipeline::Pipeline;
use std::any::Any;
use std::error::Error;
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::Instrument;

/// A running set of queue consumers
pub struct WorkerPool {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Starts consumers for every queue
    ///
    /// # Arguments
    ///
    /// * `pipeline` - Services shared by the task bodies
    /// * `config` - Consumers per queue and the global in-flight bound
    pub fn start(pipeline: Arc<Pipeline>, config: &WorkerConfig) -> Self {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let permits = Arc::new(Semaphore::new(config.max_in_flight.max(1) as usize));
        let concurrency = config.concurrency.max(1);

        let mut handles = Vec::new();
        for queue in QueueName::ALL {
            for worker_id in 0..concurrency {
                handles.push(tokio::spawn(consume_loop(
                    Arc::clone(&pipeline),
                    queue,
                    worker_id,
                    Arc::clone(&permits),
                    shutdown_rx.clone(),
                )));
            }
        }

        tracing::info!(
            queues = QueueName::ALL.len(),
            concurrency,
            max_in_flight = config.max_in_flight,
            "Worker pool started"
        );

        Self { shutdown, handles }
    }

    /// Number of consumer tasks
    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Returns a receiver that observes this pool's shutdown signal
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Stops taking new messages and waits for in-flight bodies to finish
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Worker ended abnormally");
            }
        }
        tracing::info!("Worker pool stopped");
    }
}

async fn consume_loop(
    pipeline: Arc<Pipeline>,
    queue: QueueName,
    worker_id: u32,
    permits: Arc<Semaphore>,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::debug!(%queue, worker_id, "Worker started");

    loop {
        if *shutdown.borrow() {
            break;
        }

        let delivery = tokio::select! {
            _ = shutdown.changed() => break,
            delivery = pipeline.broker().consume(queue) => delivery,
        };

        let delivery = match delivery {
            Ok(delivery) => delivery,
            Err(e) => {
                tracing::error!(%queue, worker_id, error = %e, "Consume failed, stopping worker");
                break;
            }
        };

        let Ok(_permit) = Arc::clone(&permits).acquire_owned().await else {
            break;
        };
        handle_delivery(&pipeline, delivery).await;
    }

    tracing::debug!(%queue, worker_id, "Worker stopped");
}

/// Runs one delivered task to completion
///
/// The body runs in its own tokio task so a panic is caught and recorded
/// instead of taking the worker down. The delivery is acknowledged after
/// the record reaches `succeeded` or `failed`.
pub async fn handle_delivery(pipeline: &Arc<Pipeline>, delivery: Delivery) -> TaskStatus {
    let Delivery { tag, message } = delivery;
    let ctx = TaskContext::from_message(&message);
    let span = tracing::info_span!(
        "task",
        task_id = %ctx.task_id,
        task = %message.task,
        queue = %ctx.queue
    );

    async move {
        let registry = pipeline.registry();
        if registry.get(&ctx.task_id).is_err() {
            registry.put(TaskRecord::queued(&message));
        }
        let deliveries = message.deliveries;
        let _ = registry.update(&ctx.task_id, &mut |record| record.mark_running(deliveries));
        tracing::info!(retries = ctx.retries, "Task started");

        let body = {
            let pipeline = Arc::clone(pipeline);
            let ctx = ctx.clone();
            let message = message.clone();
            tokio::spawn(
                async move { pipeline.execute(&ctx, &message).await }
                    .instrument(tracing::Span::current()),
            )
        };

        let status = match body.await {
            Ok(Ok(result)) => {
                let mut result = Some(result);
                let _ = registry.update(&ctx.task_id, &mut |record| {
                    record.mark_succeeded(result.take().unwrap_or_default())
                });
                tracing::info!("Task succeeded");
                TaskStatus::Succeeded
            }
            Ok(Err(e)) => {
                let trace = error_trace(&e);
                tracing::error!(error = %e, trace = %trace, "Task failed");
                let _ = registry.update(&ctx.task_id, &mut |record| {
                    record.mark_failed(e.to_string(), trace.clone())
                });
                TaskStatus::Failed
            }
            Err(join_error) => {
                let message = if join_error.is_panic() {
                    panic_message(join_error.into_panic())
                } else {
                    join_error.to_string()
                };
                tracing::error!(panic = %message, "Task panicked");
                let _ = registry.update(&ctx.task_id, &mut |record| {
                    record.mark_failed(format!("Task panicked: {}", message), message.clone())
                });
                TaskStatus::Failed
            }
        };

        if let Err(e) = pipeline.broker().ack(tag) {
            tracing::warn!(error = %e, "Acknowledgement failed");
        }
        status
    }
    .instrument(span)
    .await
}

/// An error and every error in its source chain, outermost first
pub fn error_trace(error: &dyn Error) -> String {
    let mut trace = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        trace.push_str("\ncaused by: ");
        trace.push_str(&cause.to_string());
        source = cause.source();
    }
    trace
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
