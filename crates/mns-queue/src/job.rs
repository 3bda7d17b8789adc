//! The job handle for one received message.
//!
//! A handle is created by [`Connector::pop`] and is finished once it has been
//! deleted or released:
//!
//! ```text
//! [received] --fire--> ok  --> delete()       --> [deleted]
//!                      err --> release(delay) --> [deleted + released]
//! ```
//!
//! Releasing deletes the current delivery first and only then re-publishes
//! the raw body, so a failed delete never leaves two deliverable copies.
//! [`JobHandle::retry`] does the same but re-publishes the payload with its
//! attempt count carried forward.

use crate::connector::Connector;
use crate::error::{ConnectorError, JobError};
use crate::payload::Payload;
use crate::registry::JobRegistry;
use chrono::Duration;
use mns_runtime::{MessageId, QueueName, ReceiptHandle, ReceivedMessage};
use tracing::{debug, info};

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;

/// A single delivery of a message, bound to the connector that popped it
#[derive(Debug)]
pub struct JobHandle<'c> {
    connector: &'c Connector,
    message: ReceivedMessage,
    queue: QueueName,
    deleted: bool,
    released: bool,
}

impl<'c> JobHandle<'c> {
    pub(crate) fn new(connector: &'c Connector, queue: QueueName, message: ReceivedMessage) -> Self {
        Self {
            connector,
            message,
            queue,
            deleted: false,
            released: false,
        }
    }

    /// Decode the payload and run the registered handler
    ///
    /// # Errors
    ///
    /// - [`JobError::Decode`] if the body is not a payload
    /// - [`JobError::UnknownJobType`] if no handler is registered for the job
    /// - [`JobError::Failed`] if the handler fails
    pub async fn fire(&self, registry: &JobRegistry) -> Result<(), JobError> {
        let payload = self.payload()?;

        let handler = registry
            .get(&payload.job)
            .ok_or_else(|| JobError::UnknownJobType {
                job: payload.job.clone(),
            })?;

        debug!(
            job = %payload.job,
            message_id = %self.message_id(),
            attempts = self.total_attempts(),
            "Firing job"
        );

        handler
            .handle(self, payload.data)
            .await
            .map_err(|source| JobError::Failed {
                job: payload.job,
                source,
            })
    }

    /// Number of times this message has been received, including this one
    pub fn attempts(&self) -> u32 {
        self.message.dequeue_count
    }

    /// Attempts across every message this job has been carried in
    ///
    /// Adds the payload's recorded `attempts` from earlier retries to this
    /// message's dequeue count. Undecodable bodies count deliveries only.
    pub fn total_attempts(&self) -> u32 {
        let earlier = self.payload().map(|p| p.attempts).unwrap_or(0);
        earlier.saturating_add(self.attempts())
    }

    /// Delete this delivery from the queue
    ///
    /// The handle is marked deleted before the remote call. Calling this
    /// again repeats the remote delete with the same receipt, which the
    /// service rejects once the first delete went through.
    pub async fn delete(&mut self) -> Result<(), ConnectorError> {
        self.deleted = true;
        self.connector
            .delete_message(&self.queue, &self.message.receipt_handle)
            .await
    }

    /// Delete this delivery and re-publish the raw body after `delay`
    ///
    /// Nothing is re-published when the delete fails; the delivery then
    /// becomes visible again once its visibility timeout expires.
    pub async fn release(&mut self, delay: Duration) -> Result<MessageId, ConnectorError> {
        self.delete().await?;
        self.released = true;

        let message_id = self.connector.release(&self.queue, self, delay).await?;

        info!(
            queue = %self.queue,
            message_id = %self.message.message_id,
            new_message_id = %message_id,
            attempts = self.attempts(),
            delay_seconds = delay.num_seconds(),
            "Released job"
        );

        Ok(message_id)
    }

    /// Delete this delivery and re-publish the job after `delay`, recording
    /// the attempts made so far in the payload
    ///
    /// Falls back to [`release`](Self::release) when the body is not a
    /// payload. As with release, nothing is re-published when the delete
    /// fails.
    pub async fn retry(&mut self, delay: Duration) -> Result<MessageId, ConnectorError> {
        let payload = match self.payload() {
            Ok(payload) => payload,
            Err(_) => return self.release(delay).await,
        };
        let attempts = self.total_attempts();

        self.delete().await?;
        self.released = true;

        let message_id = self
            .connector
            .later_payload(
                delay,
                &payload.with_attempts(attempts),
                Some(self.queue.as_str()),
            )
            .await?;

        info!(
            queue = %self.queue,
            message_id = %self.message.message_id,
            new_message_id = %message_id,
            attempts,
            delay_seconds = delay.num_seconds(),
            "Retrying job"
        );

        Ok(message_id)
    }

    /// The undecoded message body
    pub fn raw_body(&self) -> &str {
        &self.message.body
    }

    /// Decode the message body
    pub fn payload(&self) -> Result<Payload, JobError> {
        Payload::decode(&self.message.body).map_err(JobError::Decode)
    }

    pub fn queue(&self) -> &QueueName {
        &self.queue
    }

    pub fn message_id(&self) -> &MessageId {
        &self.message.message_id
    }

    pub fn receipt_handle(&self) -> &ReceiptHandle {
        &self.message.receipt_handle
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Check [`total_attempts`](Self::total_attempts) against the payload's
    /// `max_tries`, or `default` when the payload sets none or cannot be
    /// decoded
    pub fn has_exceeded_max_tries(&self, default: u32) -> bool {
        let max_tries = self
            .payload()
            .ok()
            .and_then(|p| p.max_tries)
            .unwrap_or(default);

        self.total_attempts() > max_tries
    }
}
