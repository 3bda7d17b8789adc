//! Common test utilities for mns-queue integration tests
//!
//! This module provides:
//! - A stateful fake of the MNS message endpoints, served through wiremock
//! - Connector builders for the fake and for the in-memory provider
//! - A recording job handler

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use mns_queue::{Connector, JobHandle, JobHandler, QueueConfig};
use mns_runtime::{InMemoryConfig, InMemoryProvider, QueueName};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use wiremock::matchers::path_regex;
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

pub const ACCESS_ID: &str = "integration-id";
pub const ACCESS_KEY: &str = "integration-key";

// ============================================================================
// Fake MNS
// ============================================================================

/// A message held by the fake service
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub struct StoredMessage {
    pub queue: String,
    pub id: String,
    /// Body exactly as it appeared in the send request
    pub wire_body: String,
    pub delay_seconds: u64,
    pub dequeue_count: u32,
    receipt: Option<String>,
    visible_at: Instant,
}

#[derive(Debug, Default)]
struct FakeState {
    messages: VecDeque<StoredMessage>,
    next_id: u64,
    next_receipt: u64,
    sent: Vec<StoredMessage>,
    deleted: Vec<String>,
    authorizations: Vec<String>,
}

/// In-process stand-in for the MNS queue message API
///
/// Sends, receives and deletes behave like the service: received messages
/// stay invisible for the visibility timeout and come back with a higher
/// dequeue count unless deleted with their current receipt handle. Long
/// polls return immediately.
#[derive(Clone)]
pub struct FakeMns {
    state: Arc<Mutex<FakeState>>,
    visibility_timeout: Duration,
}

#[allow(dead_code)]
impl FakeMns {
    pub fn new(visibility_timeout: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState::default())),
            visibility_timeout,
        }
    }

    /// Start a mock server answering every queue message request
    pub async fn start(&self) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(path_regex(r"^/queues/[^/]+/messages$"))
            .respond_with(self.clone())
            .mount(&server)
            .await;
        server
    }

    /// Every send request seen, in order
    pub fn sent(&self) -> Vec<StoredMessage> {
        self.state.lock().unwrap().sent.clone()
    }

    /// Message IDs removed by successful deletes, in order
    pub fn deleted(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted.clone()
    }

    /// Messages still held, visible or not
    pub fn stored(&self) -> usize {
        self.state.lock().unwrap().messages.len()
    }

    /// `Authorization` headers of every request
    pub fn authorizations(&self) -> Vec<String> {
        self.state.lock().unwrap().authorizations.clone()
    }

    fn send(&self, queue: &str, request: &Request) -> ResponseTemplate {
        let body = String::from_utf8_lossy(&request.body);
        let Some(wire_body) = element(&body, "MessageBody") else {
            return error_response(400, "InvalidArgument", "MessageBody is required");
        };
        let delay_seconds = element(&body, "DelaySeconds")
            .and_then(|d| d.parse().ok())
            .unwrap_or(0);

        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let message = StoredMessage {
            queue: queue.to_string(),
            id: format!("MSG-{:04}", state.next_id),
            wire_body: wire_body.to_string(),
            delay_seconds,
            dequeue_count: 0,
            receipt: None,
            visible_at: Instant::now() + Duration::from_secs(delay_seconds),
        };
        let id = message.id.clone();
        state.sent.push(message.clone());
        state.messages.push_back(message);

        ResponseTemplate::new(201).set_body_string(format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><Message xmlns="http://mns.aliyuncs.com/doc/v1/"><MessageId>{}</MessageId><MessageBodyMD5>00000000000000000000000000000000</MessageBodyMD5></Message>"#,
            id
        ))
    }

    fn receive(&self, queue: &str) -> ResponseTemplate {
        let now = Instant::now();
        let mut state = self.state.lock().unwrap();
        state.next_receipt += 1;
        let receipt = format!("RECEIPT-{}", state.next_receipt);

        let Some(message) = state
            .messages
            .iter_mut()
            .find(|m| m.queue == queue && m.visible_at <= now)
        else {
            return error_response(404, "MessageNotExist", "Message not exist.");
        };

        message.dequeue_count += 1;
        message.receipt = Some(receipt.clone());
        message.visible_at = now + self.visibility_timeout;

        ResponseTemplate::new(200).set_body_string(format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><Message xmlns="http://mns.aliyuncs.com/doc/v1/"><MessageId>{}</MessageId><ReceiptHandle>{}</ReceiptHandle><MessageBodyMD5>00000000000000000000000000000000</MessageBodyMD5><MessageBody>{}</MessageBody><EnqueueTime>1250700979248</EnqueueTime><NextVisibleTime>1250700799348</NextVisibleTime><FirstDequeueTime>1250700779318</FirstDequeueTime><DequeueCount>{}</DequeueCount><Priority>8</Priority></Message>"#,
            message.id, receipt, message.wire_body, message.dequeue_count
        ))
    }

    fn delete(&self, queue: &str, request: &Request) -> ResponseTemplate {
        let receipt = request
            .url
            .query_pairs()
            .find(|(key, _)| key == "ReceiptHandle")
            .map(|(_, value)| value.into_owned());

        let now = Instant::now();
        let mut state = self.state.lock().unwrap();
        let position = state.messages.iter().position(|m| {
            m.queue == queue && m.receipt.is_some() && m.receipt == receipt && m.visible_at > now
        });

        match position.and_then(|p| state.messages.remove(p)) {
            Some(message) => {
                state.deleted.push(message.id);
                ResponseTemplate::new(204)
            }
            None => error_response(404, "MessageNotExist", "Message not exist."),
        }
    }
}

impl Respond for FakeMns {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let authorization = request
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !authorization.starts_with(&format!("MNS {}:", ACCESS_ID)) {
            return error_response(403, "SignatureDoesNotMatch", "Signature mismatch.");
        }
        self.state.lock().unwrap().authorizations.push(authorization);

        let queue = request
            .url
            .path_segments()
            .and_then(|mut segments| segments.nth(1))
            .unwrap_or_default()
            .to_string();

        match request.method.as_str() {
            "POST" => self.send(&queue, request),
            "GET" => self.receive(&queue),
            "DELETE" => self.delete(&queue, request),
            _ => error_response(405, "InvalidArgument", "Unsupported method."),
        }
    }
}

fn element<'a>(xml: &'a str, name: &str) -> Option<&'a str> {
    let open = format!("<{}>", name);
    let close = format!("</{}>", name);
    let start = xml.find(&open)? + open.len();
    let end = start + xml[start..].find(&close)?;
    Some(&xml[start..end])
}

fn error_response(status: u16, code: &str, message: &str) -> ResponseTemplate {
    ResponseTemplate::new(status).set_body_string(format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><Error xmlns="http://mns.aliyuncs.com/doc/v1/"><Code>{}</Code><Message>{}</Message><RequestId>5F3F0C5E0000000000000000</RequestId><HostId>http://mns.test</HostId></Error>"#,
        code, message
    ))
}

/// Decode a base64 wire body back to the text the connector sent
#[allow(dead_code)]
pub fn decode_wire_body(wire_body: &str) -> String {
    String::from_utf8(STANDARD.decode(wire_body).unwrap()).unwrap()
}

// ============================================================================
// Connectors
// ============================================================================

/// Connector speaking signed HTTP to `server`, without long polling
#[allow(dead_code)]
pub fn mns_connector(server: &MockServer) -> Connector {
    let config = QueueConfig::new(server.uri(), ACCESS_ID, ACCESS_KEY).with_wait(0);
    Connector::new(&config).unwrap()
}

/// Connector backed by the in-memory provider
#[allow(dead_code)]
pub fn memory_connector(visibility_timeout_ms: u64) -> Connector {
    let provider = InMemoryProvider::new(InMemoryConfig {
        max_queue_size: 1000,
        visibility_timeout_ms,
        poll_interval_ms: 5,
    });
    Connector::from_provider(
        Box::new(provider),
        QueueName::new("default".to_string()).unwrap(),
        chrono::Duration::zero(),
    )
}

// ============================================================================
// Recording Handler
// ============================================================================

/// Handler that records each delivery and fails the first `failures` calls
#[derive(Default)]
#[allow(dead_code)]
pub struct RecordingHandler {
    calls: Mutex<Vec<(u32, Value)>>,
    failures: usize,
}

#[allow(dead_code)]
impl RecordingHandler {
    pub fn failing_first(failures: usize) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failures,
        }
    }

    /// `(total attempts, data)` for every call
    pub fn calls(&self) -> Vec<(u32, Value)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobHandler for RecordingHandler {
    async fn handle(&self, job: &JobHandle<'_>, data: Value) -> anyhow::Result<()> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            calls.push((job.total_attempts(), data));
            calls.len()
        };
        if call <= self.failures {
            anyhow::bail!("transient failure {}", call);
        }
        Ok(())
    }
}
