//! Aliyun MNS provider implementation using the HTTP REST API.
//!
//! This module talks to Aliyun Message Service (MNS) queues through direct
//! HTTP calls instead of a vendor SDK, which keeps request/response handling
//! transparent and lets unit tests run against a mocked HTTP server.
//!
//! ## Operations
//!
//! | operation | request | success |
//! |---|---|---|
//! | send | `POST /queues/{queue}/messages` with an XML `<Message>` body | `201` + `MessageId` |
//! | receive | `GET /queues/{queue}/messages?waitseconds={n}` | `200` + message XML, `404 MessageNotExist` when empty |
//! | delete | `DELETE /queues/{queue}/messages?ReceiptHandle={handle}` | `204` |
//!
//! ## Authentication
//!
//! Every request carries `Authorization: MNS {AccessId}:{Signature}` where the
//! signature is `base64(HMAC-SHA1(AccessKey, StringToSign))` and
//!
//! ```text
//! StringToSign = VERB + "\n"
//!              + Content-MD5 + "\n"
//!              + Content-Type + "\n"
//!              + Date + "\n"
//!              + CanonicalizedMNSHeaders
//!              + CanonicalizedResource
//! ```
//!
//! ## Long polling
//!
//! A receive with `waitseconds > 0` is held open by the service until a
//! message arrives or the wait (max 30 seconds) elapses. The HTTP timeout
//! for receives is the wait plus the configured request timeout.
//!
//! ## Example
//!
//! ```no_run
//! use mns_runtime::{AliyunMnsProvider, MnsConfig, Message, QueueName, QueueProvider};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let provider = AliyunMnsProvider::new(MnsConfig::new(
//!     "https://1234567890.mns.cn-hangzhou.aliyuncs.com",
//!     "LTAI-example",
//!     "example-secret",
//! ))?;
//!
//! let queue = QueueName::new("default".to_string())?;
//! let id = provider.send_message(&queue, &Message::new("hello")).await?;
//! # Ok(())
//! # }
//! ```

use crate::client::QueueProvider;
use crate::error::{ConfigurationError, QueueError, SerializationError};
use crate::message::{Message, MessageId, QueueName, ReceiptHandle, ReceivedMessage, Timestamp};
use crate::provider::{MnsConfig, ProviderType};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use reqwest::{Client as HttpClient, Method, StatusCode};
use sha1::Sha1;
use std::collections::HashMap;
use std::fmt;
use tracing::debug;
use url::Url;
use zeroize::{Zeroize, ZeroizeOnDrop};

#[cfg(test)]
#[path = "mns_tests.rs"]
mod tests;

/// API version sent in `x-mns-version`
const MNS_VERSION: &str = "2015-06-06";

/// XML namespace of MNS request and response documents
const MNS_XMLNS: &str = "http://mns.aliyuncs.com/doc/v1/";

const CONTENT_TYPE: &str = "text/xml;charset=utf-8";

// ============================================================================
// Error Types
// ============================================================================

/// MNS specific errors
#[derive(Debug, thiserror::Error)]
pub enum MnsError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("MNS service error: {code} - {message}")]
    ServiceError { code: String, message: String },

    #[error("Queue not found: {0}")]
    QueueNotFound(String),

    #[error("No message available")]
    MessageNotExist,

    #[error("Invalid receipt handle: {0}")]
    InvalidReceipt(String),

    #[error("Message too large: {size} bytes (max: {max_size})")]
    MessageTooLarge { size: usize, max_size: usize },

    #[error("Invalid configuration: {0}")]
    ConfigurationError(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),
}

impl MnsError {
    /// Map MNS error to QueueError
    pub fn to_queue_error(self) -> QueueError {
        match self {
            Self::Authentication(msg) => QueueError::AuthenticationFailed { message: msg },
            Self::NetworkError(msg) => QueueError::ConnectionFailed { message: msg },
            Self::ServiceError { code, message } => QueueError::ProviderError {
                provider: ProviderType::AliyunMns.to_string(),
                code,
                message,
            },
            Self::QueueNotFound(queue) => QueueError::QueueNotFound { queue_name: queue },
            Self::MessageNotExist => QueueError::MessageNotFound {
                receipt: String::new(),
            },
            Self::InvalidReceipt(receipt) => QueueError::MessageNotFound { receipt },
            Self::MessageTooLarge { size, max_size } => {
                QueueError::MessageTooLarge { size, max_size }
            }
            Self::ConfigurationError(msg) => {
                QueueError::ConfigurationError(ConfigurationError::Invalid { message: msg })
            }
            Self::Serialization(e) => QueueError::SerializationError(e),
        }
    }
}

// ============================================================================
// MNS Request Signing
// ============================================================================

type HmacSha1 = Hmac<Sha1>;

/// Signer producing the `Authorization` header for MNS requests
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
struct MnsSigner {
    access_id: String,
    access_key: String,
}

impl MnsSigner {
    fn new(access_id: String, access_key: String) -> Self {
        Self {
            access_id,
            access_key,
        }
    }

    /// Build the string to sign for a request
    ///
    /// `resource` is the request path plus query string, exactly as sent.
    fn string_to_sign(
        method: &str,
        content_md5: &str,
        content_type: &str,
        date: &str,
        resource: &str,
    ) -> String {
        // Only x-mns-version is sent, so it is the whole canonical header block
        let canonical_headers = format!("x-mns-version:{}\n", MNS_VERSION);

        format!(
            "{}\n{}\n{}\n{}\n{}{}",
            method, content_md5, content_type, date, canonical_headers, resource
        )
    }

    /// Compute the base64 HMAC-SHA1 signature of a string to sign
    fn signature(&self, string_to_sign: &str) -> Result<String, MnsError> {
        let mut mac = HmacSha1::new_from_slice(self.access_key.as_bytes())
            .map_err(|e| MnsError::Authentication(format!("Invalid access key: {}", e)))?;
        mac.update(string_to_sign.as_bytes());

        Ok(STANDARD.encode(mac.finalize().into_bytes()))
    }

    /// Build the `Authorization` header value
    fn authorization(&self, string_to_sign: &str) -> Result<String, MnsError> {
        Ok(format!(
            "MNS {}:{}",
            self.access_id,
            self.signature(string_to_sign)?
        ))
    }
}

// ============================================================================
// Aliyun MNS Provider
// ============================================================================

/// Aliyun MNS queue provider implementation
///
/// Owns one HTTP client (connection pool) for the lifetime of the provider;
/// dropping the provider releases the session and wipes the credentials.
pub struct AliyunMnsProvider {
    http_client: HttpClient,
    signer: MnsSigner,
    config: MnsConfig,
    endpoint: Url,
}

impl AliyunMnsProvider {
    /// Create new MNS provider
    ///
    /// # Errors
    ///
    /// Returns error if the endpoint or credentials are missing, the endpoint
    /// is not an http(s) URL, or the HTTP client cannot be built. No network
    /// call is made.
    pub fn new(config: MnsConfig) -> Result<Self, MnsError> {
        if config.access_id.is_empty() {
            return Err(MnsError::ConfigurationError(
                "access_id cannot be empty".to_string(),
            ));
        }
        if config.access_key.is_empty() {
            return Err(MnsError::ConfigurationError(
                "access_key cannot be empty".to_string(),
            ));
        }
        if config.endpoint.is_empty() {
            return Err(MnsError::ConfigurationError(
                "endpoint cannot be empty".to_string(),
            ));
        }

        let endpoint = Url::parse(&config.endpoint)
            .map_err(|e| MnsError::ConfigurationError(format!("Invalid endpoint: {}", e)))?;
        if endpoint.scheme() != "http" && endpoint.scheme() != "https" {
            return Err(MnsError::ConfigurationError(format!(
                "Endpoint must use http or https, got '{}'",
                endpoint.scheme()
            )));
        }

        let http_client = HttpClient::builder()
            .build()
            .map_err(|e| MnsError::NetworkError(format!("Failed to create HTTP client: {}", e)))?;

        let signer = MnsSigner::new(config.access_id.clone(), config.access_key.clone());

        Ok(Self {
            http_client,
            signer,
            config,
            endpoint,
        })
    }

    /// Path of the messages collection of a queue
    fn messages_resource(queue: &QueueName) -> String {
        format!("/queues/{}/messages", queue.as_str())
    }

    /// Make a signed HTTP request to MNS
    ///
    /// Returns the response body of a successful (2xx) response; any other
    /// status is mapped from the MNS error document.
    async fn make_request(
        &self,
        method: Method,
        resource: &str,
        body: Option<String>,
        timeout: std::time::Duration,
    ) -> Result<String, MnsError> {
        let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        let string_to_sign =
            MnsSigner::string_to_sign(method.as_str(), "", CONTENT_TYPE, &date, resource);
        let authorization = self.signer.authorization(&string_to_sign)?;

        let url = self
            .endpoint
            .join(resource)
            .map_err(|e| MnsError::ConfigurationError(format!("Invalid resource: {}", e)))?;

        debug!(method = %method, resource = %resource, "Sending MNS request");

        let mut request = self
            .http_client
            .request(method, url)
            .timeout(timeout)
            .header("Authorization", authorization)
            .header("Date", date)
            .header("Content-Type", CONTENT_TYPE)
            .header("x-mns-version", MNS_VERSION);

        if let Some(body) = body {
            request = request.body(body);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                MnsError::NetworkError(format!("Request timeout: {}", e))
            } else if e.is_connect() {
                MnsError::NetworkError(format!("Connection failed: {}", e))
            } else {
                MnsError::NetworkError(format!("HTTP request failed: {}", e))
            }
        })?;

        let status = response.status();
        let response_body = response
            .text()
            .await
            .map_err(|e| MnsError::NetworkError(format!("Failed to read response body: {}", e)))?;

        if !status.is_success() {
            return Err(self.parse_error_response(&response_body, status));
        }

        Ok(response_body)
    }

    /// Default timeout for requests that do not long-poll
    fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.config.request_timeout_seconds)
    }

    /// Encode a message body for the wire
    fn encode_body(&self, body: &str) -> String {
        if self.config.base64_body {
            STANDARD.encode(body.as_bytes())
        } else {
            body.to_string()
        }
    }

    /// Decode a message body received from the wire
    fn decode_body(&self, body: String) -> Result<String, MnsError> {
        if !self.config.base64_body {
            return Ok(body);
        }

        let bytes =
            STANDARD
                .decode(body.trim())
                .map_err(|e| SerializationError::InvalidBase64 {
                    message: e.to_string(),
                })?;
        Ok(String::from_utf8(bytes).map_err(|_| SerializationError::InvalidUtf8)?)
    }

    /// Build the XML document for SendMessage
    fn build_send_message_body(&self, message: &Message) -> Result<String, MnsError> {
        let encoded = self.encode_body(&message.body);

        let max_size = ProviderType::AliyunMns.max_message_size();
        if encoded.len() > max_size {
            return Err(MnsError::MessageTooLarge {
                size: encoded.len(),
                max_size,
            });
        }

        let delay = message
            .delay_seconds()
            .clamp(0, ProviderType::AliyunMns.max_delay_seconds());
        let priority = message
            .priority
            .map(|p| format!("<Priority>{}</Priority>", p.clamp(1, 16)))
            .unwrap_or_default();

        Ok(format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><Message xmlns="{}"><MessageBody>{}</MessageBody><DelaySeconds>{}</DelaySeconds>{}</Message>"#,
            MNS_XMLNS,
            quick_xml::escape::escape(&encoded),
            delay,
            priority
        ))
    }

    /// Parse error response from XML
    fn parse_error_response(&self, xml: &str, status: StatusCode) -> MnsError {
        let fields = collect_fields(xml).unwrap_or_default();

        let code = fields
            .get("Code")
            .cloned()
            .unwrap_or_else(|| "Unknown".to_string());
        let message = fields
            .get("Message")
            .cloned()
            .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));

        match code.as_str() {
            "MessageNotExist" => MnsError::MessageNotExist,
            "QueueNotExist" => MnsError::QueueNotFound(message),
            "ReceiptHandleError" => MnsError::InvalidReceipt(message),
            "InvalidAccessKeyId" | "SignatureDoesNotMatch" | "AccessDenied" => {
                MnsError::Authentication(format!("{}: {}", code, message))
            }
            _ if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN => {
                MnsError::Authentication(format!("{}: {}", code, message))
            }
            _ => MnsError::ServiceError { code, message },
        }
    }

    /// Parse SendMessage XML response
    fn parse_send_message_response(&self, xml: &str) -> Result<MessageId, MnsError> {
        let fields = collect_fields(xml)?;

        fields
            .get("MessageId")
            .and_then(|id| id.parse::<MessageId>().ok())
            .ok_or_else(|| missing_element("MessageId"))
    }

    /// Parse ReceiveMessage XML response
    fn parse_receive_message_response(&self, xml: &str) -> Result<ReceivedMessage, MnsError> {
        let mut fields = collect_fields(xml)?;

        let required = |fields: &mut HashMap<String, String>, name: &str| {
            fields.remove(name).ok_or_else(|| missing_element(name))
        };

        let message_id = required(&mut fields, "MessageId")?
            .parse::<MessageId>()
            .map_err(|_| missing_element("MessageId"))?;
        let receipt = required(&mut fields, "ReceiptHandle")?;
        let body = self.decode_body(required(&mut fields, "MessageBody")?)?;

        // A delivered message has been dequeued at least once
        let dequeue_count = fields
            .get("DequeueCount")
            .and_then(|c| c.trim().parse::<u32>().ok())
            .unwrap_or(1)
            .max(1);

        let millis = |name: &str| {
            fields
                .get(name)
                .and_then(|v| v.trim().parse::<i64>().ok())
                .and_then(Timestamp::from_millis)
        };

        let next_visible_at = millis("NextVisibleTime").unwrap_or_else(Timestamp::now);
        let enqueued_at = millis("EnqueueTime").unwrap_or_else(Timestamp::now);
        let first_dequeued_at = millis("FirstDequeueTime");
        let priority = fields
            .get("Priority")
            .and_then(|p| p.trim().parse::<u8>().ok());

        Ok(ReceivedMessage {
            message_id,
            body,
            receipt_handle: ReceiptHandle::new(receipt, next_visible_at, ProviderType::AliyunMns),
            dequeue_count,
            enqueued_at,
            first_dequeued_at,
            priority,
        })
    }
}

fn missing_element(name: &str) -> MnsError {
    SerializationError::MissingElement {
        element: name.to_string(),
    }
    .into()
}

fn xml_error(e: impl fmt::Display) -> MnsError {
    SerializationError::Xml {
        message: e.to_string(),
    }
    .into()
}

/// Collect the text of every element in a flat MNS document by local name
///
/// MNS request and response documents are a single root element with leaf
/// children, so the last element name seen is enough context. Empty elements
/// are recorded with empty text.
fn collect_fields(xml: &str) -> Result<HashMap<String, String>, MnsError> {
    use quick_xml::events::Event;
    use quick_xml::Reader;

    let mut reader = Reader::from_str(xml);
    reader.trim_text(false);

    let mut fields: HashMap<String, String> = HashMap::new();
    let mut current: Option<String> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                fields.entry(name.clone()).or_default();
                current = Some(name);
            }
            Ok(Event::Empty(ref e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                fields.entry(name).or_default();
            }
            Ok(Event::Text(e)) => {
                if let Some(name) = current.as_ref() {
                    let text = e.unescape().map_err(xml_error)?;
                    fields.entry(name.clone()).or_default().push_str(&text);
                }
            }
            Ok(Event::CData(e)) => {
                if let Some(name) = current.as_ref() {
                    let text = String::from_utf8_lossy(&e.into_inner()).into_owned();
                    fields.entry(name.clone()).or_default().push_str(&text);
                }
            }
            Ok(Event::End(_)) => current = None,
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(fields)
}

impl fmt::Debug for AliyunMnsProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AliyunMnsProvider")
            .field("endpoint", &self.endpoint.as_str())
            .field("config", &self.config)
            .finish()
    }
}

#[async_trait]
impl QueueProvider for AliyunMnsProvider {
    async fn send_message(
        &self,
        queue: &QueueName,
        message: &Message,
    ) -> Result<MessageId, QueueError> {
        let body = self
            .build_send_message_body(message)
            .map_err(|e| e.to_queue_error())?;

        let response = self
            .make_request(
                Method::POST,
                &Self::messages_resource(queue),
                Some(body),
                self.request_timeout(),
            )
            .await
            .map_err(|e| e.to_queue_error())?;

        self.parse_send_message_response(&response)
            .map_err(|e| e.to_queue_error())
    }

    async fn receive_message(
        &self,
        queue: &QueueName,
        wait: Duration,
    ) -> Result<Option<ReceivedMessage>, QueueError> {
        let wait_seconds = wait
            .num_seconds()
            .clamp(0, ProviderType::AliyunMns.max_wait_seconds());

        let resource = format!(
            "{}?waitseconds={}",
            Self::messages_resource(queue),
            wait_seconds
        );
        let timeout = self.request_timeout() + std::time::Duration::from_secs(wait_seconds as u64);

        match self
            .make_request(Method::GET, &resource, None, timeout)
            .await
        {
            Ok(response) => self
                .parse_receive_message_response(&response)
                .map(Some)
                .map_err(|e| e.to_queue_error()),
            Err(MnsError::MessageNotExist) => Ok(None),
            Err(e) => Err(e.to_queue_error()),
        }
    }

    async fn delete_message(
        &self,
        queue: &QueueName,
        receipt: &ReceiptHandle,
    ) -> Result<(), QueueError> {
        let resource = format!(
            "{}?ReceiptHandle={}",
            Self::messages_resource(queue),
            urlencoding::encode(receipt.handle())
        );

        match self
            .make_request(Method::DELETE, &resource, None, self.request_timeout())
            .await
        {
            Ok(_) => Ok(()),
            Err(MnsError::MessageNotExist) => Err(QueueError::MessageNotFound {
                receipt: receipt.handle().to_string(),
            }),
            Err(e) => Err(e.to_queue_error()),
        }
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::AliyunMns
    }
}
