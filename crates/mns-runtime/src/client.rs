//! The provider trait and factory.

use crate::error::QueueError;
use crate::message::{Message, MessageId, QueueName, ReceiptHandle, ReceivedMessage};
use crate::provider::{ProviderConfig, ProviderType};
use crate::providers::{AliyunMnsProvider, InMemoryProvider};
use async_trait::async_trait;
use chrono::Duration;

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;

/// Interface implemented by specific queue providers
///
/// A provider is a live session with the queue service. Queue references are
/// plain [`QueueName`] values resolved per call.
#[async_trait]
pub trait QueueProvider: Send + Sync {
    /// Send a single message, honouring its delay
    async fn send_message(
        &self,
        queue: &QueueName,
        message: &Message,
    ) -> Result<MessageId, QueueError>;

    /// Receive a single message, waiting up to `wait` for one to arrive
    ///
    /// Returns `Ok(None)` when the queue stays empty for the whole wait.
    async fn receive_message(
        &self,
        queue: &QueueName,
        wait: Duration,
    ) -> Result<Option<ReceivedMessage>, QueueError>;

    /// Delete the delivery identified by the receipt handle
    async fn delete_message(
        &self,
        queue: &QueueName,
        receipt: &ReceiptHandle,
    ) -> Result<(), QueueError>;

    /// Get provider type
    fn provider_type(&self) -> ProviderType;
}

/// Factory for creating providers from configuration
pub struct QueueProviderFactory;

impl QueueProviderFactory {
    /// Create a provider from configuration
    pub fn create(config: ProviderConfig) -> Result<Box<dyn QueueProvider>, QueueError> {
        let provider: Box<dyn QueueProvider> = match config {
            ProviderConfig::AliyunMns(mns_config) => {
                Box::new(AliyunMnsProvider::new(mns_config).map_err(|e| e.to_queue_error())?)
            }
            ProviderConfig::InMemory(in_memory_config) => {
                Box::new(InMemoryProvider::new(in_memory_config))
            }
        };

        Ok(provider)
    }
}
