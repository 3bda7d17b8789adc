//! Job payloads.
//!
//! A payload is the JSON document carried in a message body:
//!
//! ```json
//! {"job":"SendEmailJob","data":{"to":"a@b.com"},"max_tries":5,"attempts":2}
//! ```
//!
//! `max_tries` and `timeout` are omitted when unset, `attempts` when zero.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A job type plus its arguments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    /// Job type identifier, looked up in the [`JobRegistry`](crate::JobRegistry)
    pub job: String,

    /// Arguments handed to the job handler
    #[serde(default)]
    pub data: Value,

    /// Deliveries allowed before the job is given up on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tries: Option<u32>,

    /// Execution time budget in seconds; zero means no limit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    /// Deliveries made before the job was last retried
    ///
    /// MNS starts every re-published message at a dequeue count of one, so
    /// the count so far travels in the payload.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub attempts: u32,
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

impl Payload {
    pub fn new(job: impl Into<String>, data: Value) -> Self {
        Self {
            job: job.into(),
            data,
            max_tries: None,
            timeout: None,
            attempts: 0,
        }
    }

    pub fn with_max_tries(mut self, max_tries: u32) -> Self {
        self.max_tries = Some(max_tries);
        self
    }

    pub fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.timeout = Some(timeout_seconds);
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    /// Time budget for one execution, if limited
    pub fn time_limit(&self) -> Option<std::time::Duration> {
        self.timeout
            .filter(|seconds| *seconds > 0)
            .map(std::time::Duration::from_secs)
    }

    /// Encode to the JSON text sent as the message body
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode a message body
    pub fn decode(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }
}

#[cfg(test)]
#[path = "payload_tests.rs"]
mod tests;
