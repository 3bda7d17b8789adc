//! Test doubles shared by the unit tests.

use crate::connector::Connector;
use crate::job::JobHandle;
use crate::registry::JobHandler;
use async_trait::async_trait;
use chrono::Duration;
use mns_runtime::{
    Message, MessageId, ProviderType, QueueError, QueueName, QueueProvider, ReceiptHandle,
    ReceivedMessage, Timestamp,
};
use mockall::mock;
use serde_json::Value;
use std::sync::Mutex;

mock! {
    pub Provider {}

    #[async_trait]
    impl QueueProvider for Provider {
        async fn send_message(
            &self,
            queue: &QueueName,
            message: &Message,
        ) -> Result<MessageId, QueueError>;

        async fn receive_message(
            &self,
            queue: &QueueName,
            wait: Duration,
        ) -> Result<Option<ReceivedMessage>, QueueError>;

        async fn delete_message(
            &self,
            queue: &QueueName,
            receipt: &ReceiptHandle,
        ) -> Result<(), QueueError>;

        fn provider_type(&self) -> ProviderType;
    }
}

/// Mock provider that answers `provider_type`, which the connector calls
/// when logging and on drop
pub fn mock_provider() -> MockProvider {
    let mut provider = MockProvider::new();
    provider
        .expect_provider_type()
        .return_const(ProviderType::AliyunMns);
    provider
}

pub fn queue(name: &str) -> QueueName {
    QueueName::new(name.to_string()).unwrap()
}

/// Connector over a provider, defaulting to queue `default` with no wait
pub fn connector(provider: impl QueueProvider + 'static) -> Connector {
    Connector::from_provider(Box::new(provider), queue("default"), Duration::zero())
}

pub const RECEIPT: &str = "1-ODU4OTkzNDU5My0xNDMyNzI3ODI3LTItOA==";

/// A delivery as MNS would report it
pub fn received(body: &str, dequeue_count: u32) -> ReceivedMessage {
    ReceivedMessage {
        message_id: "5F290C926D472878-2-14D9529A8FA-200000001".parse().unwrap(),
        body: body.to_string(),
        receipt_handle: ReceiptHandle::new(
            RECEIPT.to_string(),
            Timestamp::from_datetime(Timestamp::now().as_datetime() + Duration::seconds(30)),
            ProviderType::AliyunMns,
        ),
        dequeue_count,
        enqueued_at: Timestamp::now(),
        first_dequeued_at: Some(Timestamp::now()),
        priority: None,
    }
}

/// Handler that records the data it is called with
#[derive(Default)]
pub struct RecordingHandler {
    calls: Mutex<Vec<Value>>,
    fail_with: Option<String>,
}

impl RecordingHandler {
    pub fn failing(message: &str) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_with: Some(message.to_string()),
        }
    }

    pub fn calls(&self) -> Vec<Value> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobHandler for RecordingHandler {
    async fn handle(&self, _job: &JobHandle<'_>, data: Value) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push(data);
        match &self.fail_with {
            Some(message) => Err(anyhow::anyhow!(message.clone())),
            None => Ok(()),
        }
    }
}
