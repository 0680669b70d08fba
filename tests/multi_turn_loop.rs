//! End-to-end tests of the multi-turn tool-calling loop: a one-hop
//! tool call through a plain action before stopping, validation
//! feedback fed back into the conversation, iteration exhaustion
//! synthesizing a stop-action call, and the empty-tool-calls retry
//! reminder.

use std::sync::Arc;

use action_orchestrator::cascade::{CascadeClient, CascadeConfig, CascadeEntry, EndpointStore, IntelligenceLevel, ModelEndpoint};
use action_orchestrator::schema::{PrimitiveType, PropertySchema, Schema};
use action_orchestrator::{
    Action, ActionRegistry, Executor, Intelligence, LlmToolChoiceStep, ProcedureStep, Step,
    SystemPromptSpec, ToolChoice,
};

use mockito::{Matcher, Server, ServerGuard};
use serde_json::json;

fn ping_action() -> Action {
    Action::new(
        "PING",
        "Replies with pong.",
        Schema::empty(),
        vec![Step::Procedure(ProcedureStep {
            name: "pong".to_string(),
            run: Arc::new(|_params, _prev, _ctx| Box::pin(async { Ok(json!({"pong": true})) })),
        })],
    )
    .unwrap()
}

fn fill_action() -> Action {
    let mut schema = Schema::empty();
    schema.properties.insert(
        "element_id".to_string(),
        PropertySchema {
            kind: PrimitiveType::Number,
            description: "target element".to_string(),
            r#enum: None,
            items: None,
        },
    );
    schema.required.push("element_id".to_string());

    Action::new(
        "FILL",
        "Fills a form element.",
        schema,
        vec![Step::Procedure(ProcedureStep {
            name: "fill".to_string(),
            run: Arc::new(|params, _prev, _ctx| Box::pin(async move { Ok(params) })),
        })],
    )
    .unwrap()
}

/// Stop action. Declares `messages` explicitly since the multi-turn
/// loop always injects that field into the stop action's call before
/// executing it.
fn chat_action() -> Action {
    let mut schema = Schema::empty();
    schema.properties.insert(
        "response".to_string(),
        PropertySchema {
            kind: PrimitiveType::String,
            description: "final reply".to_string(),
            r#enum: None,
            items: None,
        },
    );
    schema.properties.insert(
        "success".to_string(),
        PropertySchema {
            kind: PrimitiveType::Boolean,
            description: "whether the task succeeded".to_string(),
            r#enum: None,
            items: None,
        },
    );
    schema.properties.insert(
        "messages".to_string(),
        PropertySchema {
            kind: PrimitiveType::Array,
            description: "full conversation transcript".to_string(),
            r#enum: None,
            items: None,
        },
    );
    schema.required.push("response".to_string());

    Action::new(
        "CHAT",
        "Stops the loop with a final reply.",
        schema,
        vec![Step::Procedure(ProcedureStep {
            name: "echo".to_string(),
            run: Arc::new(|params, _prev, _ctx| Box::pin(async move { Ok(params) })),
        })],
    )
    .unwrap()
}

fn router_action(available: &[&str], stop_action: &str, max_iterations: u32) -> Action {
    let mut schema = Schema::empty();
    schema.properties.insert(
        "query".to_string(),
        PropertySchema {
            kind: PrimitiveType::String,
            description: "the user's request".to_string(),
            r#enum: None,
            items: None,
        },
    );

    Action::new(
        "ROUTER",
        "Routes to the right tool.",
        schema,
        vec![Step::LlmToolChoice(LlmToolChoiceStep {
            system_prompt: SystemPromptSpec::literal("You are a router."),
            message: "{{query}}".to_string(),
            intelligence: Intelligence::High,
            tool_choice: ToolChoice::new(
                available.iter().map(|s| s.to_string()).collect(),
                stop_action,
                max_iterations,
            )
            .unwrap(),
        })],
    )
    .unwrap()
}

fn tool_call_body(id: &str, name: &str, arguments: serde_json::Value) -> String {
    json!({
        "choices": [{
            "message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": id,
                    "type": "function",
                    "function": {
                        "name": name,
                        "arguments": arguments.to_string()
                    }
                }]
            }
        }]
    })
    .to_string()
}

fn text_body(content: &str) -> String {
    json!({
        "choices": [{
            "message": {
                "role": "assistant",
                "content": content,
                "tool_calls": []
            }
        }]
    })
    .to_string()
}

async fn build_executor(server: &ServerGuard, registry: ActionRegistry) -> Executor {
    let mut endpoints = EndpointStore::new();
    endpoints.insert("ep", ModelEndpoint::new(format!("{}/chat", server.url()), "k"));
    let config = CascadeConfig::new(vec![CascadeEntry::new(IntelligenceLevel::High, "ep", "model")]);
    let cascade = CascadeClient::builder()
        .endpoints(endpoints)
        .config(config)
        .build()
        .unwrap();

    Executor::builder()
        .registry(Arc::new(registry))
        .cascade(Arc::new(cascade))
        .build()
        .unwrap()
}

#[tokio::test]
async fn one_hop_tool_call_then_stop() {
    let mut server = Server::new_async().await;

    let ping_turn = server
        .mock("POST", "/chat")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(tool_call_body("1", "PING", json!({})))
        .expect(1)
        .create_async()
        .await;

    let stop_turn = server
        .mock("POST", "/chat")
        .match_body(Matcher::Regex("pong".to_string()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(tool_call_body(
            "2",
            "CHAT",
            json!({"response": "done really", "success": true}),
        ))
        .expect(1)
        .create_async()
        .await;

    let registry = ActionRegistry::builder()
        .action(router_action(&["PING", "CHAT"], "CHAT", 5))
        .action(ping_action())
        .action(chat_action())
        .build()
        .unwrap();
    let executor = build_executor(&server, registry).await;

    let result = executor
        .execute("ROUTER", json!({"query": "say hi"}))
        .await
        .unwrap();
    assert_eq!(result, json!("done really"));

    ping_turn.assert_async().await;
    stop_turn.assert_async().await;
}

#[tokio::test]
async fn validation_failure_is_fed_back_then_stop() {
    let mut server = Server::new_async().await;

    let bad_fill_turn = server
        .mock("POST", "/chat")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(tool_call_body("1", "FILL", json!({"element_id": "abc"})))
        .expect(1)
        .create_async()
        .await;

    let stop_turn = server
        .mock("POST", "/chat")
        .match_body(Matcher::Regex("Validation failed".to_string()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(tool_call_body(
            "2",
            "CHAT",
            json!({"response": "done after validation"}),
        ))
        .expect(1)
        .create_async()
        .await;

    let registry = ActionRegistry::builder()
        .action(router_action(&["FILL", "CHAT"], "CHAT", 5))
        .action(fill_action())
        .action(chat_action())
        .build()
        .unwrap();
    let executor = build_executor(&server, registry).await;

    let result = executor
        .execute("ROUTER", json!({"query": "fill element 3"}))
        .await
        .unwrap();
    assert_eq!(result, json!("done after validation"));

    bad_fill_turn.assert_async().await;
    stop_turn.assert_async().await;
}

#[tokio::test]
async fn iteration_exhaustion_synthesizes_stop_call() {
    let mut server = Server::new_async().await;

    // The model calls PING on every turn; the loop never reaches the
    // stop action itself, so exhaustion after `max_iterations` must
    // synthesize the stop call directly.
    let always_ping = server
        .mock("POST", "/chat")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(tool_call_body("1", "PING", json!({})))
        .expect(2)
        .create_async()
        .await;

    let registry = ActionRegistry::builder()
        .action(router_action(&["PING", "CHAT"], "CHAT", 2))
        .action(ping_action())
        .action(chat_action())
        .build()
        .unwrap();
    let executor = build_executor(&server, registry).await;

    let result = executor
        .execute("ROUTER", json!({"query": "loop forever"}))
        .await
        .unwrap();
    assert_eq!(
        result,
        json!("Unable to complete the task within the allotted iterations.")
    );

    always_ping.assert_async().await;
}

#[tokio::test]
async fn empty_tool_calls_trigger_retry_reminder_then_stop() {
    let mut server = Server::new_async().await;

    let text_only_turn = server
        .mock("POST", "/chat")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(text_body("I could do that."))
        .expect(1)
        .create_async()
        .await;

    let stop_turn = server
        .mock("POST", "/chat")
        .match_body(Matcher::Regex(
            "Please call one of the available tools".to_string(),
        ))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(tool_call_body("1", "CHAT", json!({"response": "ok now"})))
        .expect(1)
        .create_async()
        .await;

    let registry = ActionRegistry::builder()
        .action(router_action(&["PING", "CHAT"], "CHAT", 5))
        .action(ping_action())
        .action(chat_action())
        .build()
        .unwrap();
    let executor = build_executor(&server, registry).await;

    let result = executor
        .execute("ROUTER", json!({"query": "say hi"}))
        .await
        .unwrap();
    assert_eq!(result, json!("ok now"));

    text_only_turn.assert_async().await;
    stop_turn.assert_async().await;
}
