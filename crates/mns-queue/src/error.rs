//! Error types for the queue driver.

use mns_runtime::{QueueError, ValidationError};
use thiserror::Error;

/// Errors raised while building or validating connector configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}")]
    Missing { key: &'static str },

    #[error("Invalid configuration for {key}: {message}")]
    Invalid { key: &'static str, message: String },

    #[error("Failed to load configuration: {message}")]
    Load { message: String },

    #[error("Failed to create queue provider: {message}")]
    Provider { message: String },
}

/// Errors returned by [`Connector`](crate::Connector) operations
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The remote queue service rejected or failed the operation
    #[error("{operation} failed on queue '{queue}': {source}")]
    Transport {
        operation: &'static str,
        queue: String,
        #[source]
        source: QueueError,
    },

    #[error("Invalid queue name: {0}")]
    InvalidQueueName(#[from] ValidationError),

    #[error("Failed to encode payload: {0}")]
    Encode(#[source] serde_json::Error),
}

impl ConnectorError {
    /// Check if the failed operation may succeed when repeated
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport { source, .. } => source.is_transient(),
            Self::Config(_) => false,
            Self::InvalidQueueName(_) => false,
            Self::Encode(_) => false,
        }
    }
}

/// Errors raised while executing a job
#[derive(Debug, Error)]
pub enum JobError {
    /// The message body is not a valid payload
    #[error("Failed to decode job payload: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("No handler registered for job type '{job}'")]
    UnknownJobType { job: String },

    /// The handler ran and reported a failure
    #[error("Job '{job}' failed: {source}")]
    Failed {
        job: String,
        #[source]
        source: anyhow::Error,
    },

    /// The handler did not finish within the payload's time budget
    #[error("Job '{job}' timed out after {seconds} seconds")]
    TimedOut { job: String, seconds: u64 },
}

impl JobError {
    /// Errors that will fail again on every delivery of the same body
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Decode(_) | Self::UnknownJobType { .. })
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
