//! Cascade failover across endpoints: the skip-gate back-off, the
//! fallback pass, and success resetting a triple's counters.

use std::time::Duration;

use action_orchestrator::cascade::{
    CascadeClient, CascadeConfig, CascadeEntry, EndpointStore, HealthKey, IntelligenceLevel,
    Metric, ModelEndpoint, RequestShape,
};
use action_orchestrator::error::ProviderError;
use action_orchestrator::{Conversation, Message, Schema};

use mockito::Server;
use serde_json::json;

fn success_body(response_text: &str) -> String {
    json!({
        "choices": [{
            "message": {
                "role": "assistant",
                "content": response_text,
                "tool_calls": []
            }
        }]
    })
    .to_string()
}

fn view() -> Vec<Message> {
    let mut conv = Conversation::new();
    conv.push(Message::system("sys"));
    conv.push(Message::user("hi"));
    conv.to_view()
}

fn schema_shape() -> RequestShape {
    RequestShape::Schema(Schema::empty())
}

#[tokio::test]
async fn primary_pass_fails_over_to_next_entry() {
    let mut server = Server::new_async().await;
    let failing = server
        .mock("POST", "/a")
        .with_status(503)
        .with_body("service unavailable")
        .expect(1)
        .create_async()
        .await;
    let succeeding = server
        .mock("POST", "/b")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(success_body("from-b"))
        .expect(1)
        .create_async()
        .await;

    let mut endpoints = EndpointStore::new();
    endpoints.insert("a", ModelEndpoint::new(format!("{}/a", server.url()), "k"));
    endpoints.insert("b", ModelEndpoint::new(format!("{}/b", server.url()), "k"));

    let config = CascadeConfig::new(vec![
        CascadeEntry::new(IntelligenceLevel::High, "a", "model-a"),
        CascadeEntry::new(IntelligenceLevel::High, "b", "model-b"),
    ]);

    let client = CascadeClient::builder()
        .endpoints(endpoints)
        .config(config)
        .build()
        .unwrap();

    let result = client
        .generate(&view(), IntelligenceLevel::High, schema_shape())
        .await
        .unwrap();

    match result {
        Message::Assistant { content, .. } => assert_eq!(content.as_deref(), Some("from-b")),
        other => panic!("expected assistant message, got {other:?}"),
    }

    let a_key = HealthKey::new("a", "model-a", None);
    assert_eq!(client.health().counts(&a_key).error, 1);

    failing.assert_async().await;
    succeeding.assert_async().await;
}

#[tokio::test]
async fn skip_gate_avoids_a_model_with_an_outstanding_error() {
    let mut server = Server::new_async().await;
    let succeeding = server
        .mock("POST", "/b")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(success_body("from-b"))
        .expect(1)
        .create_async()
        .await;

    let mut endpoints = EndpointStore::new();
    // Unroutable: if the gate fails to skip entry `a`, the connection
    // error would bump its error count past 1 and the assertion below
    // would catch it.
    endpoints.insert("a", ModelEndpoint::new("http://127.0.0.1:9/unroutable", "k"));
    endpoints.insert("b", ModelEndpoint::new(format!("{}/b", server.url()), "k"));

    let config = CascadeConfig::new(vec![
        CascadeEntry::new(IntelligenceLevel::High, "a", "model-a"),
        CascadeEntry::new(IntelligenceLevel::High, "b", "model-b"),
    ]);

    let client = CascadeClient::builder()
        .endpoints(endpoints)
        .config(config)
        .build()
        .unwrap();

    let a_key = HealthKey::new("a", "model-a", None);
    client.health().increment(&a_key, Metric::Error, 1);

    client
        .generate(&view(), IntelligenceLevel::High, schema_shape())
        .await
        .unwrap();

    let counts = client.health().counts(&a_key);
    assert_eq!(counts.error, 1, "entry `a` must not have been attempted");
    assert_eq!(counts.skip, 1);

    succeeding.assert_async().await;
}

#[tokio::test]
async fn fallback_pass_retries_after_primary_pass_is_exhausted() {
    let mut server = Server::new_async().await;
    let a_mock = server
        .mock("POST", "/a")
        .with_status(503)
        .with_body("down")
        .expect(2)
        .create_async()
        .await;
    let b_mock = server
        .mock("POST", "/b")
        .with_status(503)
        .with_body("down")
        .expect(2)
        .create_async()
        .await;

    let mut endpoints = EndpointStore::new();
    endpoints.insert("a", ModelEndpoint::new(format!("{}/a", server.url()), "k"));
    endpoints.insert("b", ModelEndpoint::new(format!("{}/b", server.url()), "k"));

    let config = CascadeConfig::new(vec![
        CascadeEntry::new(IntelligenceLevel::High, "a", "model-a"),
        CascadeEntry::new(IntelligenceLevel::High, "b", "model-b"),
    ]);

    let client = CascadeClient::builder()
        .endpoints(endpoints)
        .config(config)
        .build()
        .unwrap();

    let err = client
        .generate(&view(), IntelligenceLevel::High, schema_shape())
        .await
        .unwrap_err();
    assert!(matches!(err, action_orchestrator::error::ProviderError::Exhausted { .. }));

    // Primary pass attempts each once, fallback pass retries each once
    // more (ignoring the skip gate): two failures per entry.
    let a_key = HealthKey::new("a", "model-a", None);
    let b_key = HealthKey::new("b", "model-b", None);
    assert_eq!(client.health().counts(&a_key).error, 2);
    assert_eq!(client.health().counts(&b_key).error, 2);

    a_mock.assert_async().await;
    b_mock.assert_async().await;
}

#[tokio::test]
async fn llm_call_timeout_is_classified_separately_from_other_failures() {
    let mut server = Server::new_async().await;
    // A vanishingly small `llm_timeout` guarantees the client aborts
    // the request before this mock can ever answer it, even over
    // loopback.
    let _mock = server
        .mock("POST", "/a")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(success_body("too-slow-to-matter"))
        .create_async()
        .await;

    let mut endpoints = EndpointStore::new();
    endpoints.insert("a", ModelEndpoint::new(format!("{}/a", server.url()), "k"));

    let config = CascadeConfig::new(vec![CascadeEntry::new(IntelligenceLevel::High, "a", "model-a")]);

    let client = CascadeClient::builder()
        .endpoints(endpoints)
        .config(config)
        .llm_timeout(Duration::from_nanos(1))
        .build()
        .unwrap();

    let err = client
        .generate(&view(), IntelligenceLevel::High, schema_shape())
        .await
        .unwrap_err();

    match err {
        ProviderError::Exhausted { last_was_timeout, .. } => assert!(last_was_timeout),
        other => panic!("expected a timeout-flagged Exhausted error, got {other:?}"),
    }
}

#[tokio::test]
async fn success_resets_error_and_skip_counters() {
    let mut server = Server::new_async().await;
    let succeeding = server
        .mock("POST", "/a")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(success_body("recovered"))
        .expect(1)
        .create_async()
        .await;

    let mut endpoints = EndpointStore::new();
    endpoints.insert("a", ModelEndpoint::new(format!("{}/a", server.url()), "k"));

    let config = CascadeConfig::new(vec![CascadeEntry::new(
        IntelligenceLevel::High,
        "a",
        "model-a",
    )]);

    let client = CascadeClient::builder()
        .endpoints(endpoints)
        .config(config)
        .build()
        .unwrap();

    let a_key = HealthKey::new("a", "model-a", None);
    client.health().increment(&a_key, Metric::Error, 1);
    client.health().increment(&a_key, Metric::Skip, 1);

    client
        .generate(&view(), IntelligenceLevel::High, schema_shape())
        .await
        .unwrap();

    let counts = client.health().counts(&a_key);
    assert_eq!(counts.error, 0);
    assert_eq!(counts.skip, 0);
    assert!(counts.success >= 1);

    succeeding.assert_async().await;
}
