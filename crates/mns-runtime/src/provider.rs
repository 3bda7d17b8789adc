//! Provider types and configuration.

use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Enumeration of supported queue providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderType {
    AliyunMns,
    InMemory,
}

impl ProviderType {
    /// Get maximum message size for provider
    pub fn max_message_size(&self) -> usize {
        match self {
            Self::AliyunMns => 64 * 1024,         // 64KB
            Self::InMemory => 10 * 1024 * 1024, // 10MB
        }
    }

    /// Longest delay the provider accepts, in seconds
    pub fn max_delay_seconds(&self) -> i64 {
        match self {
            Self::AliyunMns => 604_800, // 7 days
            Self::InMemory => 604_800,
        }
    }

    /// Longest long-poll wait the provider accepts, in seconds
    pub fn max_wait_seconds(&self) -> i64 {
        match self {
            Self::AliyunMns => 30,
            Self::InMemory => 30,
        }
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AliyunMns => f.write_str("AliyunMns"),
            Self::InMemory => f.write_str("InMemory"),
        }
    }
}

/// Provider-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ProviderConfig {
    AliyunMns(MnsConfig),
    InMemory(InMemoryConfig),
}

/// Aliyun MNS configuration
///
/// The access key is wiped from memory when the configuration is dropped and
/// never appears in `Debug` output.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct MnsConfig {
    /// Account endpoint, e.g. `https://1234567890.mns.cn-hangzhou.aliyuncs.com`
    pub endpoint: String,
    pub access_id: String,
    pub access_key: String,
    /// Base64-encode message bodies on send and decode them on receive
    #[serde(default = "default_base64_body")]
    pub base64_body: bool,
    /// HTTP timeout for a request, added on top of any long-poll wait
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
}

fn default_base64_body() -> bool {
    true
}

fn default_request_timeout_seconds() -> u64 {
    10
}

impl MnsConfig {
    /// Create configuration with default encoding and timeout settings
    pub fn new(
        endpoint: impl Into<String>,
        access_id: impl Into<String>,
        access_key: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            access_id: access_id.into(),
            access_key: access_key.into(),
            base64_body: default_base64_body(),
            request_timeout_seconds: default_request_timeout_seconds(),
        }
    }
}

impl fmt::Debug for MnsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MnsConfig")
            .field("endpoint", &self.endpoint)
            .field("access_id", &self.access_id)
            .field("access_key", &"<REDACTED>")
            .field("base64_body", &self.base64_body)
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .finish()
    }
}

/// In-memory provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InMemoryConfig {
    /// Maximum number of messages held per queue
    pub max_queue_size: usize,
    /// How long a received message stays hidden before redelivery
    pub visibility_timeout_ms: u64,
    /// Sleep between availability checks while long-polling
    pub poll_interval_ms: u64,
}

impl Default for InMemoryConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 10000,
            visibility_timeout_ms: 30_000,
            poll_interval_ms: 50,
        }
    }
}

#[cfg(test)]
#[path = "provider_tests.rs"]
mod tests;
