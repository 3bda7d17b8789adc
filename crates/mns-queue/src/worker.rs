//! Worker loop: pop a message, fire its job, acknowledge the outcome.

use crate::connector::Connector;
use crate::error::{ConnectorError, JobError};
use crate::job::JobHandle;
use crate::registry::JobRegistry;
use crate::retry::RetryPolicy;
use chrono::Duration;
use mns_runtime::MessageId;
use std::future::Future;
use tracing::{debug, error, info, warn};

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;

/// Attempts allowed when a payload does not set `max_tries`
pub const DEFAULT_MAX_TRIES: u32 = 3;

/// Pause after a failed pop before polling again
const POP_ERROR_BACKOFF: std::time::Duration = std::time::Duration::from_secs(1);

/// Result of processing at most one message
#[derive(Debug, Clone, PartialEq)]
pub enum WorkOutcome {
    /// No message arrived within the long-poll wait
    Idle,

    /// The job succeeded and the message was deleted
    Completed { message_id: MessageId },

    /// The job failed and was re-published with a delay
    ///
    /// `attempts` counts every delivery so far, across re-publishes.
    Released {
        message_id: MessageId,
        attempts: u32,
        delay: Duration,
    },

    /// The job was given up on and the message deleted
    Failed { message_id: MessageId, reason: String },
}

/// Processes jobs from one connector, one message at a time
#[derive(Debug)]
pub struct Worker {
    connector: Connector,
    registry: JobRegistry,
    retry_policy: RetryPolicy,
    max_tries: u32,
}

impl Worker {
    pub fn new(connector: Connector, registry: JobRegistry) -> Self {
        Self {
            connector,
            registry,
            retry_policy: RetryPolicy::default(),
            max_tries: DEFAULT_MAX_TRIES,
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Attempts allowed for payloads that do not set their own `max_tries`
    pub fn with_max_tries(mut self, max_tries: u32) -> Self {
        self.max_tries = max_tries;
        self
    }

    pub fn connector(&self) -> &Connector {
        &self.connector
    }

    /// Pop and process at most one message
    ///
    /// # Errors
    ///
    /// Returns the connector error when the pop, delete or release fails.
    /// Job failures are not errors; they are reported in the outcome.
    pub async fn run_next(&self, queue: Option<&str>) -> Result<WorkOutcome, ConnectorError> {
        match self.connector.pop(queue).await? {
            Some(job) => self.process(job).await,
            None => Ok(WorkOutcome::Idle),
        }
    }

    /// Process messages until `shutdown` resolves
    ///
    /// Shutdown interrupts the long-poll wait but never a job that is already
    /// running. Failed pops are logged and retried after a short pause.
    /// Returns the number of messages processed.
    pub async fn run<F>(&self, queue: Option<&str>, shutdown: F) -> u64
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut processed = 0u64;

        info!(
            queue = queue.unwrap_or(self.connector.default_queue().as_str()),
            job_types = ?self.registry.job_types(),
            "Worker started"
        );

        loop {
            let popped = tokio::select! {
                _ = &mut shutdown => break,
                popped = self.connector.pop(queue) => popped,
            };

            match popped {
                Ok(Some(job)) => {
                    processed += 1;
                    match self.process(job).await {
                        Ok(outcome) => debug!(?outcome, "Processed message"),
                        Err(e) => warn!(error = %e, "Failed to acknowledge message"),
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, "Failed to pop message, backing off");
                    tokio::select! {
                        _ = &mut shutdown => break,
                        _ = tokio::time::sleep(POP_ERROR_BACKOFF) => {}
                    }
                }
            }
        }

        info!(processed, "Worker stopped");
        processed
    }

    /// Fire the job, bounded by the payload's time budget when it sets one
    async fn fire(&self, job: &JobHandle<'_>) -> Result<(), JobError> {
        let limit = job
            .payload()
            .ok()
            .and_then(|p| p.time_limit().map(|limit| (p.job, limit)));

        let Some((name, limit)) = limit else {
            return job.fire(&self.registry).await;
        };

        match tokio::time::timeout(limit, job.fire(&self.registry)).await {
            Ok(result) => result,
            Err(_) => Err(JobError::TimedOut {
                job: name,
                seconds: limit.as_secs(),
            }),
        }
    }

    async fn process(&self, mut job: JobHandle<'_>) -> Result<WorkOutcome, ConnectorError> {
        let message_id = job.message_id().clone();
        let attempts = job.total_attempts();

        if job.has_exceeded_max_tries(self.max_tries) {
            error!(
                message_id = %message_id,
                attempts,
                "Job has been attempted too many times, deleting"
            );
            job.delete().await?;
            return Ok(WorkOutcome::Failed {
                message_id,
                reason: format!("exceeded max tries after {} attempts", attempts - 1),
            });
        }

        match self.fire(&job).await {
            Ok(()) => {
                job.delete().await?;
                Ok(WorkOutcome::Completed { message_id })
            }
            Err(e) if e.is_permanent() => {
                error!(message_id = %message_id, error = %e, "Job cannot be executed, deleting");
                job.delete().await?;
                Ok(WorkOutcome::Failed {
                    message_id,
                    reason: e.to_string(),
                })
            }
            Err(e) => {
                let delay = self.retry_policy.release_delay(attempts);
                warn!(
                    message_id = %message_id,
                    attempts,
                    delay_seconds = delay.num_seconds(),
                    error = %e,
                    "Job failed, retrying"
                );
                job.retry(delay).await?;
                Ok(WorkOutcome::Released {
                    message_id,
                    attempts,
                    delay,
                })
            }
        }
    }
}
