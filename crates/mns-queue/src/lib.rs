//! # MNS Queue
//!
//! Job queue driver for Aliyun Message Service (MNS).
//!
//! A [`Connector`] owns the session to the queue service and pushes, delays,
//! pops and deletes messages on named queues. Each popped message is wrapped
//! in a [`JobHandle`], which decodes the [`Payload`], dispatches it through a
//! [`JobRegistry`] and finally either deletes the delivery or releases it back
//! onto the queue with a delay.
//!
//! ```text
//! push ──► [sent] ──pop──► [received] ──fire──► ok ──► delete()  ──► [deleted]
//!                              ▲                  └─► err ─► release(delay)
//!                              └───────── re-published copy ◄────┘
//! ```
//!
//! The [`Worker`] runs that loop for one connector, using a [`RetryPolicy`]
//! to pick release delays.
//!
//! ## Module Organization
//!
//! - [`config`] - Connector configuration and loading
//! - [`connector`] - Queue operations against the remote service
//! - [`job`] - The per-message job handle
//! - [`payload`] - Job payload encoding
//! - [`registry`] - Job type to handler mapping
//! - [`retry`] - Release delay calculation
//! - [`worker`] - Pop / fire / acknowledge loop
//! - [`error`] - Error types

pub mod config;
pub mod connector;
pub mod error;
pub mod job;
pub mod payload;
pub mod registry;
pub mod retry;
pub mod worker;

pub use config::{load_config, QueueConfig};
pub use connector::Connector;
pub use error::{ConfigError, ConnectorError, JobError};
pub use job::JobHandle;
pub use payload::Payload;
pub use registry::{JobHandler, JobRegistry};
pub use retry::RetryPolicy;
pub use worker::{WorkOutcome, Worker};

// Transport types that appear in the public API
pub use mns_runtime::{MessageId, QueueName, ReceiptHandle};

#[cfg(test)]
mod test_support;

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
