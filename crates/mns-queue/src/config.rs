//! Connector configuration.
//!
//! Configuration is layered with the `config` crate. Sources are applied in
//! order, later sources overriding earlier ones:
//!
//! 1. `/etc/mns-queue/queue.yaml` (optional)
//! 2. `config/queue.yaml` relative to the working directory (optional)
//! 3. An explicit file, given by the caller or `MNS_QUEUE_CONFIG` (required
//!    when given)
//! 4. Environment variables prefixed `MNS_QUEUE__`, e.g.
//!    `MNS_QUEUE__ACCESS_ID=LTAI...`
//!
//! Keys are snake_case. Files may also use the camelCase names `accessId`,
//! `accessKey`, `endPoint` and `default`.

use crate::error::ConfigError;
use chrono::Duration;
use mns_runtime::{MnsConfig, QueueName};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::info;
use url::Url;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Environment variable naming an explicit configuration file
pub const CONFIG_FILE_ENV: &str = "MNS_QUEUE_CONFIG";

/// Prefix of configuration environment variables
pub const ENV_PREFIX: &str = "MNS_QUEUE";

/// Longest long-poll wait MNS accepts
pub const MAX_WAIT_SECONDS: u64 = 30;

/// Longest message delay MNS accepts (7 days)
pub const MAX_DELAY_SECONDS: u64 = 604_800;

/// Configuration of a [`Connector`](crate::Connector)
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct QueueConfig {
    #[serde(default, alias = "accessId")]
    pub access_id: String,

    #[serde(default, alias = "accessKey")]
    pub access_key: String,

    /// Account endpoint, e.g. `https://1234567890.mns.cn-hangzhou.aliyuncs.com`
    #[serde(default, alias = "endPoint")]
    pub endpoint: String,

    /// Long-poll wait for pop, in seconds (0-30)
    #[serde(default = "default_wait")]
    pub wait: u64,

    /// Queue used when an operation names none
    #[serde(default = "default_queue_name", alias = "default")]
    pub default_queue: String,

    /// Base64-encode message bodies on the wire
    #[serde(default = "default_base64_body")]
    pub base64_body: bool,

    /// HTTP timeout per request, added on top of the long-poll wait
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
}

fn default_wait() -> u64 {
    MAX_WAIT_SECONDS
}

fn default_queue_name() -> String {
    "default".to_string()
}

fn default_base64_body() -> bool {
    true
}

fn default_request_timeout_seconds() -> u64 {
    10
}

impl QueueConfig {
    /// Create configuration with default wait, queue and encoding
    pub fn new(
        endpoint: impl Into<String>,
        access_id: impl Into<String>,
        access_key: impl Into<String>,
    ) -> Self {
        Self {
            access_id: access_id.into(),
            access_key: access_key.into(),
            endpoint: endpoint.into(),
            wait: default_wait(),
            default_queue: default_queue_name(),
            base64_body: default_base64_body(),
            request_timeout_seconds: default_request_timeout_seconds(),
        }
    }

    pub fn with_wait(mut self, wait: u64) -> Self {
        self.wait = wait;
        self
    }

    pub fn with_default_queue(mut self, queue: impl Into<String>) -> Self {
        self.default_queue = queue.into();
        self
    }

    /// Validate the configuration
    ///
    /// Missing credentials are reported in the order `access_id`,
    /// `access_key`, `endpoint`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.access_id.trim().is_empty() {
            return Err(ConfigError::Missing { key: "access_id" });
        }
        if self.access_key.trim().is_empty() {
            return Err(ConfigError::Missing { key: "access_key" });
        }
        if self.endpoint.trim().is_empty() {
            return Err(ConfigError::Missing { key: "endpoint" });
        }

        let endpoint = Url::parse(&self.endpoint).map_err(|e| ConfigError::Invalid {
            key: "endpoint",
            message: e.to_string(),
        })?;
        if endpoint.scheme() != "http" && endpoint.scheme() != "https" {
            return Err(ConfigError::Invalid {
                key: "endpoint",
                message: format!("scheme must be http or https, got '{}'", endpoint.scheme()),
            });
        }

        if self.wait > MAX_WAIT_SECONDS {
            return Err(ConfigError::Invalid {
                key: "wait",
                message: format!("must be at most {} seconds", MAX_WAIT_SECONDS),
            });
        }

        self.default_queue_name()?;

        Ok(())
    }

    /// The default queue as a validated name
    pub fn default_queue_name(&self) -> Result<QueueName, ConfigError> {
        QueueName::new(self.default_queue.clone()).map_err(|e| ConfigError::Invalid {
            key: "default_queue",
            message: e.to_string(),
        })
    }

    /// Long-poll wait as a duration
    pub fn wait_duration(&self) -> Duration {
        Duration::seconds(self.wait.min(MAX_WAIT_SECONDS) as i64)
    }

    /// Transport settings for the MNS provider
    pub fn to_mns_config(&self) -> MnsConfig {
        let mut config = MnsConfig::new(
            self.endpoint.clone(),
            self.access_id.clone(),
            self.access_key.clone(),
        );
        config.base64_body = self.base64_body;
        config.request_timeout_seconds = self.request_timeout_seconds;
        config
    }

    /// Copy with the access key masked, for display
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        config.access_key = "<REDACTED>".to_string();
        config
    }
}

impl fmt::Debug for QueueConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueConfig")
            .field("access_id", &self.access_id)
            .field("access_key", &"<REDACTED>")
            .field("endpoint", &self.endpoint)
            .field("wait", &self.wait)
            .field("default_queue", &self.default_queue)
            .field("base64_body", &self.base64_body)
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .finish()
    }
}

/// Load and validate configuration from files and the environment
///
/// `explicit_path` takes precedence over `MNS_QUEUE_CONFIG`. A malformed
/// file, an explicit file that does not exist, or a value that cannot be
/// coerced to its field type is an error.
pub fn load_config(explicit_path: Option<&Path>) -> Result<QueueConfig, ConfigError> {
    let mut builder = config::Config::builder()
        .add_source(
            config::File::with_name("/etc/mns-queue/queue")
                .required(false)
                .format(config::FileFormat::Yaml),
        )
        .add_source(
            config::File::with_name("config/queue")
                .required(false)
                .format(config::FileFormat::Yaml),
        );

    let explicit = explicit_path
        .map(Path::to_path_buf)
        .or_else(|| {
            std::env::var(CONFIG_FILE_ENV)
                .ok()
                .filter(|p| !p.is_empty())
                .map(Into::into)
        });

    if let Some(path) = explicit {
        info!(path = %path.display(), "Loading configuration from explicit path");
        builder = builder.add_source(
            config::File::from(path)
                .required(true)
                .format(config::FileFormat::Yaml),
        );
    }

    let settings = builder
        .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()
        .map_err(|e| ConfigError::Load {
            message: e.to_string(),
        })?;

    let queue_config: QueueConfig =
        settings
            .try_deserialize()
            .map_err(|e| ConfigError::Load {
                message: e.to_string(),
            })?;

    queue_config.validate()?;
    Ok(queue_config)
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
