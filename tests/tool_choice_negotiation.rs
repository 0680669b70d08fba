//! A model that rejects `tool_choice: "required"` is retried without
//! it, and verification reports `no_tool_choice: true` on that retry's
//! success.

use action_orchestrator::cascade::{CascadeClient, EndpointStore, ModelEndpoint};

use mockito::{Matcher, Server};
use serde_json::json;

fn ok_body() -> String {
    json!({
        "choices": [{
            "message": {
                "role": "assistant",
                "content": "ack",
                "tool_calls": []
            }
        }]
    })
    .to_string()
}

#[tokio::test]
async fn negotiates_away_unsupported_tool_choice() {
    let mut server = Server::new_async().await;

    // Registered first so the more specific, later-registered mock
    // below takes priority whenever both could match.
    let without_tool_choice = server
        .mock("POST", "/chat")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(ok_body())
        .expect(1)
        .create_async()
        .await;

    let with_tool_choice = server
        .mock("POST", "/chat")
        .match_body(Matcher::Regex("tool_choice".to_string()))
        .with_status(400)
        .with_body(json!({"error": {"message": "tool choice is not supported for this model"}}).to_string())
        .expect(1)
        .create_async()
        .await;

    let mut endpoints = EndpointStore::new();
    endpoints.insert("ep", ModelEndpoint::new(format!("{}/chat", server.url()), "k"));

    let client = CascadeClient::builder().endpoints(endpoints).build().unwrap();

    let result = client.verify_model("ep", "some-model", &[]).await;

    assert!(result.valid);
    assert_eq!(result.no_tool_choice, Some(true));
    assert!(result.error.is_none());

    with_tool_choice.assert_async().await;
    without_tool_choice.assert_async().await;
}

#[tokio::test]
async fn verification_succeeds_outright_when_tool_choice_is_supported() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/chat")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(ok_body())
        .expect(1)
        .create_async()
        .await;

    let mut endpoints = EndpointStore::new();
    endpoints.insert("ep", ModelEndpoint::new(format!("{}/chat", server.url()), "k"));

    let client = CascadeClient::builder().endpoints(endpoints).build().unwrap();
    let result = client.verify_model("ep", "some-model", &[]).await;

    assert!(result.valid);
    assert_eq!(result.no_tool_choice, Some(false));

    mock.assert_async().await;
}

#[tokio::test]
async fn verification_fails_when_every_probe_is_rejected() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/chat")
        .with_status(401)
        .with_body("unauthorized")
        .create_async()
        .await;

    let mut endpoints = EndpointStore::new();
    endpoints.insert("ep", ModelEndpoint::new(format!("{}/chat", server.url()), "k"));

    let client = CascadeClient::builder().endpoints(endpoints).build().unwrap();
    let result = client.verify_model("ep", "some-model", &[]).await;

    assert!(!result.valid);
    assert!(result.error.unwrap().contains("401"));
    assert!(result.no_tool_choice.is_none());

    mock.assert_async().await;
}
