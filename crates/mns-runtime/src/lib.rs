//! # MNS Runtime
//!
//! Transport layer for the MNS job queue driver. It plays the part of the
//! remote queue SDK: everything the driver needs from the queue service is
//! reachable through the [`QueueProvider`] trait.
//!
//! This library provides:
//! - Message identifiers, receipt handles and received-message metadata
//! - Typed transport errors with transience classification
//! - An Aliyun MNS provider speaking the signed HTTP/XML API
//! - An in-memory provider with visibility timeouts for tests and development
//!
//! ## Module Organization
//!
//! - [`error`] - Error types for all queue operations
//! - [`message`] - Message structures and receipt handles
//! - [`provider`] - Provider types and configuration
//! - [`client`] - The provider trait and factory
//! - [`providers`] - Concrete providers

// Module declarations
pub mod client;
pub mod error;
pub mod message;
pub mod provider;
pub mod providers;

// Re-export commonly used types at crate root for convenience
pub use client::{QueueProvider, QueueProviderFactory};
pub use error::{ConfigurationError, QueueError, SerializationError, ValidationError};
pub use message::{Message, MessageId, QueueName, ReceiptHandle, ReceivedMessage, Timestamp};
pub use provider::{InMemoryConfig, MnsConfig, ProviderConfig, ProviderType};
pub use providers::{AliyunMnsProvider, InMemoryProvider};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
