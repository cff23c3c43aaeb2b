//! Script Mode Tests
//!
//! - Header-aware per-message transforms
//! - The multi-response polling protocol over an ephemeral inbox
//! - The subscribe-before-publish ordering invariant
//! - Classification boundaries between script, transport, and timeout errors

mod common;

use std::sync::Arc;

use bytes::Bytes;
use natstable::connection::{StubEvent, StubTransport};
use natstable::{ExecutionError, QueryDefinition, QueryEngine, QueryType};
use serde_json::json;

// =============================================================================
// Helper Functions
// =============================================================================

fn script_query(script: &str, timeout: &str) -> QueryDefinition {
    common::init_tracing();
    QueryDefinition {
        query_type: QueryType::Script,
        subject: String::new(),
        request_timeout: timeout.to_string(),
        script: script.to_string(),
    }
}

const POLL_SCRIPT: &str = r#"
    let inbox = conn.new_inbox();
    let sub = conn.subscribe_sync(inbox);
    conn.publish_request("cluster.ping", inbox, "");

    let rows = [];
    loop {
        let msg = sub.next_message("100ms");
        if msg == () { break; }
        rows.push(parse_json(msg.data));
    }
    sub.unsubscribe();
    rows
"#;

// =============================================================================
// Header Access Tests
// =============================================================================

/// A script can lift a header value into the row alongside payload fields.
#[tokio::test(flavor = "multi_thread")]
async fn test_script_reads_headers_into_row() {
    let stub = StubTransport::new();
    stub.respond_to(
        "with.headers",
        natstable::NatsMessage::with_payload("with.headers", r#"{"a": 1}"#)
            .with_header("My-Header", "x"),
    );
    let engine = QueryEngine::new(Arc::new(stub));

    let query = QueryDefinition {
        query_type: QueryType::RequestReply,
        subject: "with.headers".to_string(),
        request_timeout: "1s".to_string(),
        script: r#"
            let row = parse_json(msg.data);
            row.otherHeader = msg.header.get("My-Header");
            row
        "#
        .to_string(),
    };
    let frames = engine
        .execute(&query)
        .await
        .unwrap()
        .into_frames()
        .unwrap();

    assert_eq!(frames[0].cell(0, "a"), Some(&json!(1)));
    assert_eq!(frames[0].cell(0, "otherHeader"), Some(&json!("x")));
}

// =============================================================================
// Polling Protocol Tests
// =============================================================================

/// N replies followed by silence yield exactly N rows and no sentinel row
/// for the terminating empty poll.
#[tokio::test(flavor = "multi_thread")]
async fn test_polling_yields_exactly_n_rows() {
    let stub = StubTransport::new();
    stub.fan_out_on_request(
        "cluster.ping",
        vec![
            Bytes::from_static(br#"{"node": "a"}"#),
            Bytes::from_static(br#"{"node": "b"}"#),
            Bytes::from_static(br#"{"node": "c"}"#),
        ],
    );
    let engine = QueryEngine::new(Arc::new(stub));

    let frames = engine
        .execute(&script_query(POLL_SCRIPT, "5s"))
        .await
        .unwrap()
        .into_frames()
        .unwrap();

    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].len(), 3);
    assert_eq!(frames[0].cell(0, "node"), Some(&json!("a")));
    assert_eq!(frames[0].cell(2, "node"), Some(&json!("c")));
}

/// The inbox subscription must exist before the correlated request goes
/// out; replies racing ahead of the subscription would be lost.
#[tokio::test(flavor = "multi_thread")]
async fn test_inbox_is_subscribed_before_request_is_published() {
    let stub = StubTransport::new();
    stub.fan_out_on_request("cluster.ping", vec![Bytes::from_static(b"{}")]);
    let engine = QueryEngine::new(Arc::new(stub.clone()));

    engine
        .execute(&script_query(POLL_SCRIPT, "5s"))
        .await
        .unwrap();

    let events = stub.events();
    let subscribed = events
        .iter()
        .position(|e| matches!(e, StubEvent::Subscribed(s) if s.starts_with("_INBOX.")))
        .expect("no inbox subscription recorded");
    let published = events
        .iter()
        .position(
            |e| matches!(e, StubEvent::Published { subject, .. } if subject == "cluster.ping"),
        )
        .expect("no request publish recorded");

    assert!(
        subscribed < published,
        "request was published before the inbox subscription existed"
    );
}

/// The script releases its inbox subscription before returning.
#[tokio::test(flavor = "multi_thread")]
async fn test_polling_releases_the_inbox_subscription() {
    let stub = StubTransport::new();
    stub.fan_out_on_request("cluster.ping", vec![Bytes::from_static(b"{}")]);
    let engine = QueryEngine::new(Arc::new(stub.clone()));

    engine
        .execute(&script_query(POLL_SCRIPT, "5s"))
        .await
        .unwrap();

    assert!(stub
        .events()
        .iter()
        .any(|e| matches!(e, StubEvent::Unsubscribed(s) if s.starts_with("_INBOX."))));
}

// =============================================================================
// Error Classification Tests
// =============================================================================

/// "Your script is wrong" and "the cluster is unreachable" must be
/// distinguishable: an uncaught failure caused by a connection outage is
/// `TransportError`, not `ScriptError`.
#[tokio::test(flavor = "multi_thread")]
async fn test_connection_outage_reclassifies_as_transport_error() {
    let stub = StubTransport::new();
    stub.take_connection_down();
    let engine = QueryEngine::new(Arc::new(stub));

    let err = engine
        .execute(&script_query(
            r#"conn.request("cluster.stats", "", "1s")"#,
            "5s",
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, ExecutionError::TransportError(_)));
}

/// A connection failure the script caught and handled must not be reported
/// as an outage; a script bug raised afterwards stays `ScriptError`.
#[tokio::test(flavor = "multi_thread")]
async fn test_caught_outage_does_not_mask_script_error() {
    let stub = StubTransport::new();
    stub.take_connection_down();
    let engine = QueryEngine::new(Arc::new(stub));

    let script = r#"
        try { conn.publish("events", "x"); } catch {}
        throw "bad row math";
    "#;
    let err = engine
        .execute(&script_query(script, "5s"))
        .await
        .unwrap_err();
    match err {
        ExecutionError::ScriptError(message) => assert!(message.contains("bad row math")),
        other => panic!("expected ScriptError, got {other:?}"),
    }
}

/// A script-authored throw stays `ScriptError`.
#[tokio::test(flavor = "multi_thread")]
async fn test_script_authored_failure_stays_script_error() {
    let engine = QueryEngine::new(Arc::new(StubTransport::new()));

    let err = engine
        .execute(&script_query(r#"throw "bad input";"#, "5s"))
        .await
        .unwrap_err();
    match err {
        ExecutionError::ScriptError(message) => assert!(message.contains("bad input")),
        other => panic!("expected ScriptError, got {other:?}"),
    }
}

/// An empty script in SCRIPT mode is rejected before any network call.
#[tokio::test]
async fn test_empty_script_is_invalid_query() {
    let stub = StubTransport::new();
    let engine = QueryEngine::new(Arc::new(stub.clone()));

    let err = engine.execute(&script_query("", "5s")).await.unwrap_err();
    assert!(matches!(err, ExecutionError::InvalidQuery(_)));
    assert!(stub.events().is_empty());
}

/// A runaway script is cut off by the execution deadline.
#[tokio::test(flavor = "multi_thread")]
async fn test_runaway_script_times_out() {
    let engine = QueryEngine::new(Arc::new(StubTransport::new()));

    let err = engine
        .execute(&script_query("loop {}", "100ms"))
        .await
        .unwrap_err();
    assert!(matches!(err, ExecutionError::Timeout(_)));
}
