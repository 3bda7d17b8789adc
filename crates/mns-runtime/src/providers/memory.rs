//! In-memory queue provider implementation for testing and development.
//!
//! This module provides an in-memory queue that behaves like the remote
//! service where the driver can observe it:
//! - Delayed messages stay invisible until their delay elapses
//! - Receiving hides a message for the visibility timeout and increments its
//!   dequeue count; undeleted messages are redelivered afterwards
//! - Receipt handles are single-use and stop working once the message is
//!   visible again
//! - Receives long-poll up to the requested wait
//!
//! This provider is intended for:
//! - Unit testing of driver consumers
//! - Development and prototyping

use crate::client::QueueProvider;
use crate::error::QueueError;
use crate::message::{Message, MessageId, QueueName, ReceiptHandle, ReceivedMessage, Timestamp};
use crate::provider::{InMemoryConfig, ProviderType};
use async_trait::async_trait;
use chrono::Duration;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock, RwLockWriteGuard};

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

// ============================================================================
// Internal Storage Structures
// ============================================================================

/// Thread-safe storage for all queues
struct QueueStorage {
    queues: HashMap<QueueName, InMemoryQueue>,
    config: InMemoryConfig,
}

impl QueueStorage {
    fn new(config: InMemoryConfig) -> Self {
        Self {
            queues: HashMap::new(),
            config,
        }
    }

    /// Get or create a queue
    fn get_or_create_queue(&mut self, queue_name: &QueueName) -> &mut InMemoryQueue {
        self.queues.entry(queue_name.clone()).or_default()
    }
}

/// Internal queue state for a single queue
#[derive(Default)]
struct InMemoryQueue {
    /// Messages in send order, visible or not
    messages: VecDeque<StoredMessage>,
}

/// A message stored in the queue with metadata
#[derive(Clone)]
struct StoredMessage {
    message_id: MessageId,
    body: String,
    priority: Option<u8>,
    enqueued_at: Timestamp,
    first_dequeued_at: Option<Timestamp>,
    dequeue_count: u32,
    available_at: Timestamp,
    /// Receipt of the latest delivery, if any
    receipt_handle: Option<String>,
}

impl StoredMessage {
    fn from_message(message: &Message, message_id: MessageId) -> Self {
        let now = Timestamp::now();
        let available_at = match message.delay {
            Some(delay) => Timestamp::from_datetime(now.as_datetime() + delay),
            None => now.clone(),
        };

        Self {
            message_id,
            body: message.body.clone(),
            priority: message.priority,
            enqueued_at: now,
            first_dequeued_at: None,
            dequeue_count: 0,
            available_at,
            receipt_handle: None,
        }
    }

    /// Check if message is available for receiving
    fn is_available(&self) -> bool {
        Timestamp::now() >= self.available_at
    }

    /// Hand the message out: new receipt, bumped count, hidden until the
    /// visibility timeout passes
    fn deliver(&mut self, visibility_timeout: Duration) -> ReceivedMessage {
        let now = Timestamp::now();
        let receipt = uuid::Uuid::new_v4().to_string();

        self.dequeue_count += 1;
        if self.first_dequeued_at.is_none() {
            self.first_dequeued_at = Some(now.clone());
        }
        self.available_at = Timestamp::from_datetime(now.as_datetime() + visibility_timeout);
        self.receipt_handle = Some(receipt.clone());

        ReceivedMessage {
            message_id: self.message_id.clone(),
            body: self.body.clone(),
            receipt_handle: ReceiptHandle::new(
                receipt,
                self.available_at.clone(),
                ProviderType::InMemory,
            ),
            dequeue_count: self.dequeue_count,
            enqueued_at: self.enqueued_at.clone(),
            first_dequeued_at: self.first_dequeued_at.clone(),
            priority: self.priority,
        }
    }
}

// ============================================================================
// InMemoryProvider
// ============================================================================

/// In-memory queue provider implementation
pub struct InMemoryProvider {
    storage: Arc<RwLock<QueueStorage>>,
}

impl InMemoryProvider {
    /// Create new in-memory provider with configuration
    pub fn new(config: InMemoryConfig) -> Self {
        Self {
            storage: Arc::new(RwLock::new(QueueStorage::new(config))),
        }
    }

    /// Number of messages held by a queue, visible or not
    pub fn queue_depth(&self, queue: &QueueName) -> usize {
        self.storage
            .read()
            .map(|storage| {
                storage
                    .queues
                    .get(queue)
                    .map(|q| q.messages.len())
                    .unwrap_or(0)
            })
            .unwrap_or(0)
    }

    fn lock(&self) -> Result<RwLockWriteGuard<'_, QueueStorage>, QueueError> {
        self.storage.write().map_err(|_| QueueError::ProviderError {
            provider: ProviderType::InMemory.to_string(),
            code: "LockPoisoned".to_string(),
            message: "queue storage lock poisoned".to_string(),
        })
    }

    /// Deliver the first visible message, without waiting
    fn try_receive(&self, queue: &QueueName) -> Result<Option<ReceivedMessage>, QueueError> {
        let mut storage = self.lock()?;
        let visibility_timeout = Duration::milliseconds(storage.config.visibility_timeout_ms as i64);
        let queue_state = storage.get_or_create_queue(queue);

        Ok(queue_state
            .messages
            .iter_mut()
            .find(|m| m.is_available())
            .map(|m| m.deliver(visibility_timeout)))
    }
}

impl Default for InMemoryProvider {
    fn default() -> Self {
        Self::new(InMemoryConfig::default())
    }
}

#[async_trait]
impl QueueProvider for InMemoryProvider {
    async fn send_message(
        &self,
        queue: &QueueName,
        message: &Message,
    ) -> Result<MessageId, QueueError> {
        let max_size = ProviderType::InMemory.max_message_size();
        if message.body.len() > max_size {
            return Err(QueueError::MessageTooLarge {
                size: message.body.len(),
                max_size,
            });
        }

        let mut storage = self.lock()?;
        let max_queue_size = storage.config.max_queue_size;
        let queue_state = storage.get_or_create_queue(queue);

        if queue_state.messages.len() >= max_queue_size {
            return Err(QueueError::QueueFull {
                queue_name: queue.to_string(),
                size: queue_state.messages.len(),
            });
        }

        let message_id = MessageId::new();
        queue_state
            .messages
            .push_back(StoredMessage::from_message(message, message_id.clone()));

        Ok(message_id)
    }

    async fn receive_message(
        &self,
        queue: &QueueName,
        wait: Duration,
    ) -> Result<Option<ReceivedMessage>, QueueError> {
        let wait = wait
            .clamp(
                Duration::zero(),
                Duration::seconds(ProviderType::InMemory.max_wait_seconds()),
            )
            .to_std()
            .unwrap_or_default();
        let poll_interval = {
            let storage = self.lock()?;
            std::time::Duration::from_millis(storage.config.poll_interval_ms.max(1))
        };
        let deadline = tokio::time::Instant::now() + wait;

        loop {
            if let Some(message) = self.try_receive(queue)? {
                return Ok(Some(message));
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                // Callers polling an empty queue in a loop must not starve the runtime
                tokio::task::yield_now().await;
                return Ok(None);
            }

            tokio::time::sleep(poll_interval.min(deadline - now)).await;
        }
    }

    async fn delete_message(
        &self,
        queue: &QueueName,
        receipt: &ReceiptHandle,
    ) -> Result<(), QueueError> {
        let mut storage = self.lock()?;
        let queue_state = storage.get_or_create_queue(queue);

        let position = queue_state.messages.iter().position(|m| {
            m.receipt_handle.as_deref() == Some(receipt.handle()) && !m.is_available()
        });

        match position {
            Some(index) => {
                queue_state.messages.remove(index);
                Ok(())
            }
            None => Err(QueueError::MessageNotFound {
                receipt: receipt.handle().to_string(),
            }),
        }
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::InMemory
    }
}
