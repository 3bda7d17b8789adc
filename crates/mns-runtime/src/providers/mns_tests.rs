//! Tests for the Aliyun MNS provider HTTP implementation.
//!
//! Request signing and XML parsing are checked directly; the operations run
//! against a wiremock server standing in for the MNS endpoint.

use super::*;
use wiremock::matchers::{body_string_contains, header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ============================================================================
// Test Helper Functions
// ============================================================================

fn test_config(endpoint: &str) -> MnsConfig {
    MnsConfig::new(endpoint, "test-access-id", "test-secret")
}

fn queue(name: &str) -> QueueName {
    QueueName::new(name.to_string()).unwrap()
}

async fn provider_for(server: &MockServer) -> AliyunMnsProvider {
    AliyunMnsProvider::new(test_config(&server.uri())).unwrap()
}

fn error_xml(code: &str, message: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Error xmlns="http://mns.aliyuncs.com/doc/v1/">
  <Code>{}</Code>
  <Message>{}</Message>
  <RequestId>5F1E9B1A0000000000000001</RequestId>
  <HostId>http://123.mns.cn-hangzhou.aliyuncs.com</HostId>
</Error>"#,
        code, message
    )
}

const RECEIVE_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Message xmlns="http://mns.aliyuncs.com/doc/v1/">
  <MessageId>5F290C926D472878-2-14D9529A8FA-200000001</MessageId>
  <ReceiptHandle>1-ODU4OTkzNDU5My0xNDMyNzI3ODI3LTItOA==</ReceiptHandle>
  <MessageBodyMD5>C5DD56A39F5F7BB8B3337C6D11B6D8C7</MessageBodyMD5>
  <MessageBody>eyJqb2IiOiJTZW5kRW1haWxKb2IiLCJkYXRhIjp7InRvIjoiYUBiLmNvbSJ9fQ==</MessageBody>
  <EnqueueTime>1250700979248</EnqueueTime>
  <NextVisibleTime>1250700799348</NextVisibleTime>
  <FirstDequeueTime>1250700779318</FirstDequeueTime>
  <DequeueCount>3</DequeueCount>
  <Priority>8</Priority>
</Message>"#;

// ============================================================================
// Configuration Tests
// ============================================================================

mod configuration_tests {
    use super::*;

    #[test]
    fn test_provider_creation_with_valid_config() {
        let provider =
            AliyunMnsProvider::new(test_config("https://123.mns.cn-hangzhou.aliyuncs.com"))
                .unwrap();
        assert_eq!(provider.provider_type(), ProviderType::AliyunMns);
    }

    #[test]
    fn test_provider_rejects_empty_credentials() {
        let mut config = test_config("https://123.mns.cn-hangzhou.aliyuncs.com");
        config.access_key = String::new();

        let result = AliyunMnsProvider::new(config);
        assert!(matches!(result, Err(MnsError::ConfigurationError(_))));
    }

    #[test]
    fn test_provider_rejects_non_http_endpoint() {
        let result = AliyunMnsProvider::new(test_config("ftp://example.com"));
        assert!(matches!(result, Err(MnsError::ConfigurationError(_))));

        let result = AliyunMnsProvider::new(test_config("not a url"));
        assert!(matches!(result, Err(MnsError::ConfigurationError(_))));
    }

    #[test]
    fn test_debug_does_not_leak_access_key() {
        let provider =
            AliyunMnsProvider::new(test_config("https://123.mns.cn-hangzhou.aliyuncs.com"))
                .unwrap();
        let debug_str = format!("{:?}", provider);
        assert!(!debug_str.contains("test-secret"), "{debug_str}");
    }
}

// ============================================================================
// Signature Tests
// ============================================================================

mod signature_tests {
    use super::*;

    #[test]
    fn test_string_to_sign_layout() {
        let s = MnsSigner::string_to_sign(
            "DELETE",
            "",
            CONTENT_TYPE,
            "Thu, 17 Mar 2012 18:49:58 GMT",
            "/queues/orders/messages?ReceiptHandle=abc",
        );

        assert_eq!(
            s,
            "DELETE\n\ntext/xml;charset=utf-8\nThu, 17 Mar 2012 18:49:58 GMT\nx-mns-version:2015-06-06\n/queues/orders/messages?ReceiptHandle=abc"
        );
    }

    #[test]
    fn test_signature_matches_known_vector() {
        let signer = MnsSigner::new("test-access-id".to_string(), "test-secret".to_string());
        let s = MnsSigner::string_to_sign(
            "GET",
            "",
            CONTENT_TYPE,
            "Thu, 17 Mar 2012 18:49:58 GMT",
            "/queues/orders/messages?waitseconds=10",
        );

        assert_eq!(signer.signature(&s).unwrap(), "evNMQUXEFjdBtLCXPVSy3LUJPY8=");
        assert_eq!(
            signer.authorization(&s).unwrap(),
            "MNS test-access-id:evNMQUXEFjdBtLCXPVSy3LUJPY8="
        );
    }
}

// ============================================================================
// XML Tests
// ============================================================================

mod xml_tests {
    use super::*;

    fn provider() -> AliyunMnsProvider {
        AliyunMnsProvider::new(test_config("https://123.mns.cn-hangzhou.aliyuncs.com")).unwrap()
    }

    #[test]
    fn test_send_body_is_base64_encoded_and_escaped() {
        let body = provider()
            .build_send_message_body(&Message::new("hello world").with_delay(Duration::seconds(5)))
            .unwrap();

        assert!(body.contains("<MessageBody>aGVsbG8gd29ybGQ=</MessageBody>"));
        assert!(body.contains("<DelaySeconds>5</DelaySeconds>"));
        assert!(body.contains(MNS_XMLNS));
        assert!(!body.contains("<Priority>"));
    }

    #[test]
    fn test_send_body_without_base64_escapes_markup() {
        let mut config = test_config("https://123.mns.cn-hangzhou.aliyuncs.com");
        config.base64_body = false;
        let provider = AliyunMnsProvider::new(config).unwrap();

        let body = provider
            .build_send_message_body(&Message::new("<a>&</a>"))
            .unwrap();

        assert!(body.contains("<MessageBody>&lt;a&gt;&amp;&lt;/a&gt;</MessageBody>"));
        assert!(body.contains("<DelaySeconds>0</DelaySeconds>"));
    }

    #[test]
    fn test_send_body_rejects_oversized_message() {
        let large = "x".repeat(60 * 1024); // grows past 64KB once base64 encoded
        let result = provider().build_send_message_body(&Message::new(large));

        assert!(matches!(result, Err(MnsError::MessageTooLarge { .. })));
    }

    #[test]
    fn test_parse_receive_response() {
        let received = provider().parse_receive_message_response(RECEIVE_XML).unwrap();

        assert_eq!(
            received.message_id.as_str(),
            "5F290C926D472878-2-14D9529A8FA-200000001"
        );
        assert_eq!(
            received.receipt_handle.handle(),
            "1-ODU4OTkzNDU5My0xNDMyNzI3ODI3LTItOA=="
        );
        assert_eq!(
            received.body,
            r#"{"job":"SendEmailJob","data":{"to":"a@b.com"}}"#
        );
        assert_eq!(received.dequeue_count, 3);
        assert_eq!(received.priority, Some(8));
        assert_eq!(
            received.enqueued_at,
            Timestamp::from_millis(1250700979248).unwrap()
        );
        assert!(received.first_dequeued_at.is_some());
    }

    #[test]
    fn test_parse_receive_response_missing_receipt() {
        let xml = r#"<Message><MessageId>abc</MessageId><MessageBody>eA==</MessageBody></Message>"#;
        let result = provider().parse_receive_message_response(xml);

        assert!(matches!(
            result,
            Err(MnsError::Serialization(SerializationError::MissingElement { ref element }))
                if element == "ReceiptHandle"
        ));
    }

    #[test]
    fn test_parse_receive_response_invalid_base64() {
        let xml = r#"<Message><MessageId>abc</MessageId><ReceiptHandle>r</ReceiptHandle><MessageBody>not base64!</MessageBody></Message>"#;
        let result = provider().parse_receive_message_response(xml);

        assert!(matches!(
            result,
            Err(MnsError::Serialization(SerializationError::InvalidBase64 { .. }))
        ));
    }

    #[test]
    fn test_parse_receive_response_body_not_utf8() {
        // base64 of the bytes ff fe
        let xml = r#"<Message><MessageId>abc</MessageId><ReceiptHandle>r</ReceiptHandle><MessageBody>//4=</MessageBody></Message>"#;
        let result = provider().parse_receive_message_response(xml);

        assert!(matches!(
            result,
            Err(MnsError::Serialization(SerializationError::InvalidUtf8))
        ));
    }

    #[test]
    fn test_parse_receive_response_empty_body() {
        for body in ["<MessageBody></MessageBody>", "<MessageBody/>"] {
            let xml = format!(
                "<Message><MessageId>abc</MessageId><ReceiptHandle>r</ReceiptHandle>{}<DequeueCount>1</DequeueCount></Message>",
                body
            );
            let received = provider().parse_receive_message_response(&xml).unwrap();

            assert_eq!(received.body, "");
            assert_eq!(received.receipt_handle.handle(), "r");
        }
    }

    #[test]
    fn test_parse_send_response_missing_message_id() {
        let result = provider()
            .parse_send_message_response("<Message><MessageBodyMD5>x</MessageBodyMD5></Message>");

        assert!(matches!(
            result,
            Err(MnsError::Serialization(SerializationError::MissingElement { ref element }))
                if element == "MessageId"
        ));
    }

    #[test]
    fn test_parse_error_codes() {
        let provider = provider();

        assert!(matches!(
            provider.parse_error_response(&error_xml("QueueNotExist", "gone"), StatusCode::NOT_FOUND),
            MnsError::QueueNotFound(_)
        ));
        assert!(matches!(
            provider.parse_error_response(&error_xml("MessageNotExist", "empty"), StatusCode::NOT_FOUND),
            MnsError::MessageNotExist
        ));
        assert!(matches!(
            provider.parse_error_response(
                &error_xml("ReceiptHandleError", "bad"),
                StatusCode::BAD_REQUEST
            ),
            MnsError::InvalidReceipt(_)
        ));
        assert!(matches!(
            provider.parse_error_response(
                &error_xml("SignatureDoesNotMatch", "nope"),
                StatusCode::FORBIDDEN
            ),
            MnsError::Authentication(_)
        ));
        assert!(matches!(
            provider.parse_error_response("", StatusCode::UNAUTHORIZED),
            MnsError::Authentication(_)
        ));
        assert!(matches!(
            provider.parse_error_response(
                &error_xml("InternalError", "boom"),
                StatusCode::INTERNAL_SERVER_ERROR
            ),
            MnsError::ServiceError { .. }
        ));
    }
}

// ============================================================================
// Operation Tests
// ============================================================================

mod operation_tests {
    use super::*;

    #[tokio::test]
    async fn test_send_message_posts_signed_xml() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/queues/orders/messages"))
            .and(header("x-mns-version", "2015-06-06"))
            .and(header("Content-Type", "text/xml;charset=utf-8"))
            .and(header_exists("Date"))
            .and(header_exists("Authorization"))
            .and(body_string_contains("<MessageBody>aGVsbG8gd29ybGQ=</MessageBody>"))
            .and(body_string_contains("<DelaySeconds>30</DelaySeconds>"))
            .respond_with(ResponseTemplate::new(201).set_body_string(
                r#"<?xml version="1.0" encoding="UTF-8"?>
<Message xmlns="http://mns.aliyuncs.com/doc/v1/">
  <MessageId>5F290C926D472878-2-14D9529A8FA-200000001</MessageId>
  <MessageBodyMD5>5EB63BBBE01EEED093CB22BB8F5ACDC3</MessageBodyMD5>
</Message>"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider_for(&server).await;
        let id = provider
            .send_message(
                &queue("orders"),
                &Message::new("hello world").with_delay(Duration::seconds(30)),
            )
            .await
            .unwrap();

        assert_eq!(id.as_str(), "5F290C926D472878-2-14D9529A8FA-200000001");
    }

    #[tokio::test]
    async fn test_authorization_header_uses_access_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/queues/orders/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_string(RECEIVE_XML))
            .mount(&server)
            .await;

        let provider = provider_for(&server).await;
        provider
            .receive_message(&queue("orders"), Duration::zero())
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        let authorization = requests[0]
            .headers
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap()
            .to_string();
        assert!(authorization.starts_with("MNS test-access-id:"));
    }

    #[tokio::test]
    async fn test_receive_message_long_polls_with_wait() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/queues/orders/messages"))
            .and(query_param("waitseconds", "5"))
            .respond_with(ResponseTemplate::new(200).set_body_string(RECEIVE_XML))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider_for(&server).await;
        let received = provider
            .receive_message(&queue("orders"), Duration::seconds(5))
            .await
            .unwrap()
            .expect("a message");

        assert_eq!(received.dequeue_count, 3);
        assert_eq!(
            received.body,
            r#"{"job":"SendEmailJob","data":{"to":"a@b.com"}}"#
        );
    }

    #[tokio::test]
    async fn test_receive_message_clamps_wait_to_thirty_seconds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/queues/orders/messages"))
            .and(query_param("waitseconds", "30"))
            .respond_with(
                ResponseTemplate::new(404).set_body_string(error_xml("MessageNotExist", "empty")),
            )
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider_for(&server).await;
        let received = provider
            .receive_message(&queue("orders"), Duration::seconds(120))
            .await
            .unwrap();

        assert!(received.is_none());
    }

    #[tokio::test]
    async fn test_receive_from_empty_queue_returns_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/queues/orders/messages"))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_string(error_xml("MessageNotExist", "Message not exist.")),
            )
            .mount(&server)
            .await;

        let provider = provider_for(&server).await;
        let received = provider
            .receive_message(&queue("orders"), Duration::zero())
            .await
            .unwrap();

        assert!(received.is_none());
    }

    #[tokio::test]
    async fn test_receive_from_missing_queue_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/queues/missing/messages"))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_string(error_xml("QueueNotExist", "The queue name you provided is not exist.")),
            )
            .mount(&server)
            .await;

        let provider = provider_for(&server).await;
        let result = provider
            .receive_message(&queue("missing"), Duration::zero())
            .await;

        assert!(matches!(result, Err(QueueError::QueueNotFound { .. })));
    }

    #[tokio::test]
    async fn test_delete_message_sends_receipt_handle() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/queues/orders/messages"))
            .and(query_param("ReceiptHandle", "1-ODU4OTkzNDU5My0xNDMyNzI3ODI3LTItOA=="))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider_for(&server).await;
        let receipt = ReceiptHandle::new(
            "1-ODU4OTkzNDU5My0xNDMyNzI3ODI3LTItOA==".to_string(),
            Timestamp::now(),
            ProviderType::AliyunMns,
        );

        provider
            .delete_message(&queue("orders"), &receipt)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_delete_with_stale_receipt_fails() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/queues/orders/messages"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_string(error_xml("ReceiptHandleError", "The receipt handle you provided is not valid.")),
            )
            .mount(&server)
            .await;

        let provider = provider_for(&server).await;
        let receipt = ReceiptHandle::new("stale".to_string(), Timestamp::now(), ProviderType::AliyunMns);
        let result = provider.delete_message(&queue("orders"), &receipt).await;

        assert!(matches!(result, Err(QueueError::MessageNotFound { .. })));
    }

    #[tokio::test]
    async fn test_authentication_failure_is_not_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(403)
                    .set_body_string(error_xml("InvalidAccessKeyId", "The access Id you provided is not exist.")),
            )
            .mount(&server)
            .await;

        let provider = provider_for(&server).await;
        let err = provider
            .send_message(&queue("orders"), &Message::new("x"))
            .await
            .unwrap_err();

        assert!(matches!(err, QueueError::AuthenticationFailed { .. }));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_connection_failure_maps_to_connection_error() {
        // Nothing listens on the discard port
        let provider = AliyunMnsProvider::new(test_config("http://127.0.0.1:9")).unwrap();
        let err = provider
            .send_message(&queue("orders"), &Message::new("x"))
            .await
            .unwrap_err();

        assert!(matches!(err, QueueError::ConnectionFailed { .. }));
        assert!(err.is_transient());
    }
}

// ============================================================================
// Error Mapping Tests
// ============================================================================

#[test]
fn test_mns_error_to_queue_error() {
    assert!(matches!(
        MnsError::QueueNotFound("orders".into()).to_queue_error(),
        QueueError::QueueNotFound { .. }
    ));
    assert!(matches!(
        MnsError::InvalidReceipt("r".into()).to_queue_error(),
        QueueError::MessageNotFound { .. }
    ));
    assert!(matches!(
        MnsError::ServiceError {
            code: "InternalError".into(),
            message: "x".into()
        }
        .to_queue_error(),
        QueueError::ProviderError { .. }
    ));
    assert!(matches!(
        MnsError::from(SerializationError::InvalidUtf8).to_queue_error(),
        QueueError::SerializationError(SerializationError::InvalidUtf8)
    ));
}
