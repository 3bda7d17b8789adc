//! Queue connector.
//!
//! The connector owns the provider session and performs every remote queue
//! operation. Remote failures are logged here, once, and returned as
//! [`ConnectorError::Transport`].

use crate::config::QueueConfig;
use crate::error::{ConfigError, ConnectorError};
use crate::job::JobHandle;
use crate::payload::Payload;
use chrono::Duration;
use mns_runtime::{
    Message, MessageId, ProviderConfig, QueueError, QueueName, QueueProvider,
    QueueProviderFactory, ReceiptHandle,
};
use serde_json::Value;
use std::fmt;
use tracing::{debug, error, info};

#[cfg(test)]
#[path = "connector_tests.rs"]
mod tests;

/// Connection to a remote queue service
///
/// Created once per worker. Queue names are resolved on every call, falling
/// back to the configured default queue. Dropping the connector closes the
/// provider session.
pub struct Connector {
    provider: Box<dyn QueueProvider>,
    default_queue: QueueName,
    wait: Duration,
}

impl Connector {
    /// Connect to MNS with the given configuration
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] naming the first of `access_id`,
    /// `access_key`, `endpoint` that is empty, or another configuration error
    /// for malformed values. No network call is made.
    pub fn new(config: &QueueConfig) -> Result<Self, ConnectorError> {
        config.validate()?;

        let provider = QueueProviderFactory::create(ProviderConfig::AliyunMns(
            config.to_mns_config(),
        ))
        .map_err(|e| ConfigError::Provider {
            message: e.to_string(),
        })?;

        info!(
            endpoint = %config.endpoint,
            default_queue = %config.default_queue,
            wait_seconds = config.wait,
            "Created MNS queue connector"
        );

        Ok(Self {
            provider,
            default_queue: config.default_queue_name()?,
            wait: config.wait_duration(),
        })
    }

    /// Build a connector over an existing provider
    pub fn from_provider(
        provider: Box<dyn QueueProvider>,
        default_queue: QueueName,
        wait: Duration,
    ) -> Self {
        Self {
            provider,
            default_queue,
            wait,
        }
    }

    pub fn default_queue(&self) -> &QueueName {
        &self.default_queue
    }

    /// Long-poll wait used by [`pop`](Self::pop)
    pub fn wait(&self) -> Duration {
        self.wait
    }

    /// Resolve an optional queue name, falling back to the default queue
    ///
    /// An empty name counts as no name.
    pub fn resolve_queue_name(&self, queue: Option<&str>) -> Result<QueueName, ConnectorError> {
        match queue {
            Some(name) if !name.is_empty() => Ok(QueueName::new(name.to_string())?),
            _ => Ok(self.default_queue.clone()),
        }
    }

    /// Push a job for immediate processing
    pub async fn push(
        &self,
        job: &str,
        data: Value,
        queue: Option<&str>,
    ) -> Result<MessageId, ConnectorError> {
        self.push_payload(&Payload::new(job, data), queue).await
    }

    /// Push a job that becomes visible after `delay`
    pub async fn later(
        &self,
        delay: Duration,
        job: &str,
        data: Value,
        queue: Option<&str>,
    ) -> Result<MessageId, ConnectorError> {
        self.later_payload(delay, &Payload::new(job, data), queue)
            .await
    }

    /// Push an already-built payload for immediate processing
    pub async fn push_payload(
        &self,
        payload: &Payload,
        queue: Option<&str>,
    ) -> Result<MessageId, ConnectorError> {
        self.later_payload(Duration::zero(), payload, queue).await
    }

    /// Push an already-built payload that becomes visible after `delay`
    pub async fn later_payload(
        &self,
        delay: Duration,
        payload: &Payload,
        queue: Option<&str>,
    ) -> Result<MessageId, ConnectorError> {
        let body = payload.encode().map_err(ConnectorError::Encode)?;
        self.push_raw(delay, queue, &body, 0).await
    }

    /// Re-publish the raw body of a job after `delay`
    ///
    /// The body is sent exactly as received, not re-encoded. The handle's
    /// attempt count is logged; MNS starts a fresh dequeue count for the new
    /// message.
    pub async fn release(
        &self,
        queue: &QueueName,
        job: &JobHandle<'_>,
        delay: Duration,
    ) -> Result<MessageId, ConnectorError> {
        self.push_raw(delay, Some(queue.as_str()), job.raw_body(), job.attempts())
            .await
    }

    /// Send a raw body to a queue
    ///
    /// `attempts` is advisory and only logged.
    pub async fn push_raw(
        &self,
        delay: Duration,
        queue: Option<&str>,
        payload: &str,
        attempts: u32,
    ) -> Result<MessageId, ConnectorError> {
        let queue = self.resolve_queue_name(queue)?;
        let message = Message::new(payload).with_delay(delay);

        match self.provider.send_message(&queue, &message).await {
            Ok(message_id) => {
                debug!(
                    queue = %queue,
                    message_id = %message_id,
                    delay_seconds = message.delay_seconds(),
                    attempts,
                    "Pushed message"
                );
                Ok(message_id)
            }
            Err(e) => Err(transport_error("push", &queue, e)),
        }
    }

    /// Receive the next message, waiting up to the configured wait
    ///
    /// Returns `Ok(None)` when the queue stayed empty for the whole wait.
    pub async fn pop(&self, queue: Option<&str>) -> Result<Option<JobHandle<'_>>, ConnectorError> {
        let queue = self.resolve_queue_name(queue)?;

        match self.provider.receive_message(&queue, self.wait).await {
            Ok(Some(message)) => {
                debug!(
                    queue = %queue,
                    message_id = %message.message_id,
                    attempts = message.dequeue_count,
                    "Popped message"
                );
                Ok(Some(JobHandle::new(self, queue, message)))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(transport_error("pop", &queue, e)),
        }
    }

    /// Delete one delivery of a message
    pub async fn delete_message(
        &self,
        queue: &QueueName,
        receipt: &ReceiptHandle,
    ) -> Result<(), ConnectorError> {
        match self.provider.delete_message(queue, receipt).await {
            Ok(()) => {
                debug!(queue = %queue, provider = %receipt.provider_type(), "Deleted message");
                Ok(())
            }
            Err(e) => Err(transport_error("delete", queue, e)),
        }
    }
}

/// Log a remote failure and wrap it
fn transport_error(operation: &'static str, queue: &QueueName, source: QueueError) -> ConnectorError {
    error!(
        operation,
        queue = %queue,
        error = %source,
        transient = source.is_transient(),
        "MNS operation failed"
    );

    ConnectorError::Transport {
        operation,
        queue: queue.to_string(),
        source,
    }
}

impl fmt::Debug for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connector")
            .field("provider", &self.provider.provider_type())
            .field("default_queue", &self.default_queue)
            .field("wait", &self.wait)
            .finish()
    }
}

impl Drop for Connector {
    fn drop(&mut self) {
        debug!(provider = %self.provider.provider_type(), "Closing queue connector");
    }
}
