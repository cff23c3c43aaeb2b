//! Subscribe Executor Tests
//!
//! - Each received message streams out as an independent frame emission
//! - Per-message failures are reported without ending the subscription
//! - Cancellation stops delivery and releases the subscription promptly
//! - The declared timeout gates only the time to the first message

mod common;

use std::sync::Arc;
use std::time::Duration;

use natstable::connection::{StubEvent, StubTransport};
use natstable::{
    ExecutionError, NatsMessage, QueryDefinition, QueryEngine, QueryType, SubscribeEvent,
    SubscribeStream,
};
use serde_json::json;

// =============================================================================
// Helper Functions
// =============================================================================

fn query(subject: &str, script: &str) -> QueryDefinition {
    common::init_tracing();
    QueryDefinition {
        query_type: QueryType::Subscribe,
        subject: subject.to_string(),
        request_timeout: "1s".to_string(),
        script: script.to_string(),
    }
}

async fn open_stream(stub: &StubTransport, subject: &str, script: &str) -> SubscribeStream {
    QueryEngine::new(Arc::new(stub.clone()))
        .execute(&query(subject, script))
        .await
        .unwrap()
        .into_stream()
        .unwrap()
}

async fn expect_frame(stream: &mut SubscribeStream) -> natstable::ResultFrame {
    match stream.next_event().await.expect("stream ended early") {
        SubscribeEvent::Frame(frame) => frame,
        SubscribeEvent::Error(err) => panic!("expected frame, got error {err:?}"),
    }
}

// =============================================================================
// Streaming Tests
// =============================================================================

/// Messages stream out one frame each, in arrival order, without buffering.
#[tokio::test]
async fn test_messages_stream_in_order() {
    let stub = StubTransport::new();
    let mut stream = open_stream(&stub, "events.orders", "").await;

    for seq in 1..=3 {
        stub.inject(NatsMessage::with_payload(
            "events.orders",
            format!(r#"{{"seq": {seq}}}"#),
        ));
    }

    for seq in 1..=3 {
        let frame = expect_frame(&mut stream).await;
        assert_eq!(frame.cell(0, "seq"), Some(&json!(seq)));
    }
}

/// A malformed message is reported as a per-message error and the
/// subscription keeps delivering.
#[tokio::test]
async fn test_per_message_failure_does_not_end_subscription() {
    let stub = StubTransport::new();
    let mut stream = open_stream(&stub, "events.orders", "").await;

    stub.inject(NatsMessage::with_payload("events.orders", "not json"));
    stub.inject(NatsMessage::with_payload("events.orders", r#"{"ok": true}"#));

    assert!(matches!(
        stream.next_event().await.unwrap(),
        SubscribeEvent::Error(ExecutionError::MalformedPayload { .. })
    ));
    let frame = expect_frame(&mut stream).await;
    assert_eq!(frame.cell(0, "ok"), Some(&json!(true)));
    assert_eq!(stub.subscriber_count("events.orders"), 1);
}

/// A per-message script runs once per message with the message bound.
#[tokio::test(flavor = "multi_thread")]
async fn test_per_message_script_transform() {
    let stub = StubTransport::new();
    let script = r#"
        let row = parse_json(msg.data);
        row.from = msg.subject;
        row
    "#;
    let mut stream = open_stream(&stub, "events.orders", script).await;

    stub.inject(NatsMessage::with_payload("events.orders", r#"{"id": 9}"#));

    let frame = expect_frame(&mut stream).await;
    assert_eq!(frame.cell(0, "id"), Some(&json!(9)));
    assert_eq!(frame.cell(0, "from"), Some(&json!("events.orders")));
}

// =============================================================================
// Cancellation Tests
// =============================================================================

/// Cancelling stops delivery and releases the underlying subscription.
#[tokio::test]
async fn test_cancel_releases_subscription() {
    let stub = StubTransport::new();
    let mut stream = open_stream(&stub, "events.orders", "").await;
    assert_eq!(stub.subscriber_count("events.orders"), 1);

    stream.cancel();
    assert!(matches!(
        stream.next_event().await.unwrap(),
        SubscribeEvent::Error(ExecutionError::Cancelled)
    ));
    assert!(stream.next_event().await.is_none());

    assert_eq!(stub.subscriber_count("events.orders"), 0);
    assert!(stub
        .events()
        .contains(&StubEvent::Unsubscribed("events.orders".to_string())));
}

/// Dropping the stream handle also releases the subscription.
#[tokio::test]
async fn test_drop_releases_subscription() {
    let stub = StubTransport::new();
    let stream = open_stream(&stub, "events.orders", "").await;
    drop(stream);

    // The worker observes cancellation at the next message boundary.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(stub.subscriber_count("events.orders"), 0);
}

// =============================================================================
// First-Message Gate Tests
// =============================================================================

/// With no traffic at all, the stream reports a timeout after the declared
/// budget and ends.
#[tokio::test]
async fn test_silent_subject_times_out_on_first_message_gate() {
    let stub = StubTransport::new();
    let mut stream = QueryEngine::new(Arc::new(stub.clone()))
        .execute(&QueryDefinition {
            query_type: QueryType::Subscribe,
            subject: "quiet.subject".to_string(),
            request_timeout: "50ms".to_string(),
            script: String::new(),
        })
        .await
        .unwrap()
        .into_stream()
        .unwrap();

    assert!(matches!(
        stream.next_event().await.unwrap(),
        SubscribeEvent::Error(ExecutionError::Timeout(_))
    ));
    assert!(stream.next_event().await.is_none());
    assert_eq!(stub.subscriber_count("quiet.subject"), 0);
}
