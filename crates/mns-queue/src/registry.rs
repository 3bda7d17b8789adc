//! Job registry.
//!
//! Maps job type identifiers (the `job` field of a [`Payload`](crate::Payload))
//! to the handlers that execute them. The registry is built once at startup
//! and used read-only while messages are processed.

use crate::job::JobHandle;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Executes one job type
///
/// Returning an error marks the attempt as failed; the worker then releases
/// the message back onto the queue.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &JobHandle<'_>, data: Value) -> anyhow::Result<()>;
}

/// Registry mapping job types to their handlers
///
/// # Examples
///
/// ```rust
/// use mns_queue::JobRegistry;
///
/// let registry = JobRegistry::new();
/// assert!(!registry.contains("SendEmailJob"));
/// ```
#[derive(Default, Clone)]
pub struct JobRegistry {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a job type
    ///
    /// Registering the same job type twice replaces the earlier handler.
    pub fn register(&mut self, job: impl Into<String>, handler: Arc<dyn JobHandler>) {
        self.handlers.insert(job.into(), handler);
    }

    /// Look up the handler for a job type
    pub fn get(&self, job: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(job).cloned()
    }

    pub fn contains(&self, job: &str) -> bool {
        self.handlers.contains_key(job)
    }

    /// Registered job types, sorted
    pub fn job_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRegistry")
            .field("job_types", &self.job_types())
            .finish()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
