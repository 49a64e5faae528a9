//! Message broker between dispatch and execution
//!
//! The broker keeps one FIFO per queue. Consumers receive a `Delivery` and
//! must acknowledge it once the task body has finished; deliveries that are
//! never acknowledged can be put back with `requeue_unacked`, which is how
//! work survives the loss of a worker.

use crate::pipeline::message::{QueueName, TaskMessage};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use thiserror::Error;
use tokio::sync::Notify;

/// Errors raised by a broker
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Unknown delivery tag: {0}")]
    UnknownDelivery(u64),

    #[error("Queue '{0}' is not declared")]
    UnknownQueue(QueueName),

    #[error("Broker lock poisoned")]
    LockPoisoned,
}

/// A message handed to a consumer, pending acknowledgement
#[derive(Debug, Clone)]
pub struct Delivery {
    pub tag: u64,
    pub message: TaskMessage,
}

/// Queue transport used by the router and the workers
#[async_trait]
pub trait Broker: Send + Sync {
    /// Appends a message to the queue named by its routing key
    fn publish(&self, message: TaskMessage) -> Result<(), BrokerError>;

    /// Waits for the next message of a queue
    ///
    /// Cancel safe: a message is only taken off the queue by a call that
    /// returns it.
    async fn consume(&self, queue: QueueName) -> Result<Delivery, BrokerError>;

    /// Takes the next message of a queue without waiting
    fn try_consume(&self, queue: QueueName) -> Result<Option<Delivery>, BrokerError>;

    /// Confirms a delivery was fully handled
    fn ack(&self, tag: u64) -> Result<(), BrokerError>;

    /// Puts every unacknowledged delivery back on its queue
    ///
    /// Returns how many messages were requeued.
    fn requeue_unacked(&self) -> Result<usize, BrokerError>;

    /// Messages waiting in a queue
    fn pending(&self, queue: QueueName) -> usize;

    /// Deliveries not yet acknowledged
    fn unacked(&self) -> usize;
}

struct QueueState {
    messages: Mutex<VecDeque<TaskMessage>>,
    notify: Notify,
}

impl QueueState {
    fn new() -> Self {
        Self {
            messages: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }
}

/// Broker holding its queues in process memory
pub struct InMemoryBroker {
    queues: HashMap<QueueName, QueueState>,
    unacked: DashMap<u64, TaskMessage>,
    next_tag: AtomicU64,
}

impl InMemoryBroker {
    /// Creates a broker with every queue of the topology declared
    pub fn new() -> Self {
        Self {
            queues: QueueName::ALL
                .iter()
                .map(|&name| (name, QueueState::new()))
                .collect(),
            unacked: DashMap::new(),
            next_tag: AtomicU64::new(1),
        }
    }

    fn queue(&self, name: QueueName) -> Result<&QueueState, BrokerError> {
        self.queues.get(&name).ok_or(BrokerError::UnknownQueue(name))
    }

    fn push(&self, message: TaskMessage) -> Result<(), BrokerError> {
        let queue = self.queue(message.routing_key)?;
        queue
            .messages
            .lock()
            .map_err(|_| BrokerError::LockPoisoned)?
            .push_back(message);
        queue.notify.notify_one();
        Ok(())
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    fn publish(&self, message: TaskMessage) -> Result<(), BrokerError> {
        tracing::debug!(
            task_id = %message.id,
            task = %message.task,
            queue = %message.routing_key,
            "Published task"
        );
        self.push(message)
    }

    async fn consume(&self, queue: QueueName) -> Result<Delivery, BrokerError> {
        let state = self.queue(queue)?;
        loop {
            if let Some(delivery) = self.try_consume(queue)? {
                return Ok(delivery);
            }
            state.notify.notified().await;
        }
    }

    fn try_consume(&self, queue: QueueName) -> Result<Option<Delivery>, BrokerError> {
        let state = self.queue(queue)?;
        let next = state
            .messages
            .lock()
            .map_err(|_| BrokerError::LockPoisoned)?
            .pop_front();

        let Some(mut message) = next else {
            return Ok(None);
        };

        // Another consumer may be waiting on the same queue
        if self.pending(queue) > 0 {
            state.notify.notify_one();
        }

        message.deliveries += 1;
        let tag = self.next_tag.fetch_add(1, Ordering::Relaxed);
        self.unacked.insert(tag, message.clone());
        Ok(Some(Delivery { tag, message }))
    }

    fn ack(&self, tag: u64) -> Result<(), BrokerError> {
        self.unacked
            .remove(&tag)
            .map(|_| ())
            .ok_or(BrokerError::UnknownDelivery(tag))
    }

    fn requeue_unacked(&self) -> Result<usize, BrokerError> {
        let mut tags: Vec<u64> = self.unacked.iter().map(|entry| *entry.key()).collect();
        tags.sort_unstable();

        let mut requeued = 0;
        for tag in tags {
            if let Some((_, message)) = self.unacked.remove(&tag) {
                tracing::warn!(
                    task_id = %message.id,
                    task = %message.task,
                    deliveries = message.deliveries,
                    "Requeueing unacknowledged task"
                );
                self.push(message)?;
                requeued += 1;
            }
        }
        Ok(requeued)
    }

    fn pending(&self, queue: QueueName) -> usize {
        self.queues
            .get(&queue)
            .and_then(|state| state.messages.lock().ok().map(|messages| messages.len()))
            .unwrap_or(0)
    }

    fn unacked(&self) -> usize {
        self.unacked.len()
    }
}
