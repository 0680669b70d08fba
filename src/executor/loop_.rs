//! The multi-turn loop — the central algorithm driving a model through
//! repeated tool calls until a stop action fires or the iteration
//! budget is exhausted. Deliberately a plain iterative function over
//! the conversation, not a generator or task tree: error paths need to
//! peek at and mutate the surrounding conversation directly.

use std::sync::Arc;

use serde_json::{Value, json};

use crate::action::{Action, LlmToolChoiceStep};
use crate::cascade::RequestShape;
use crate::conversation::{Conversation, Message, ToolCall};
use crate::error::ExecutorError;
use crate::template;

use super::{Executor, prompt};

const RETRY_REMINDER: &str = "Please call one of the available tools to proceed.";

pub(super) async fn run(
    executor: &Executor,
    step: &LlmToolChoiceStep,
    context: &Value,
) -> Result<Value, ExecutorError> {
    let tool_choice = &step.tool_choice;

    let mut actions = Vec::with_capacity(tool_choice.available_actions.len());
    for name in &tool_choice.available_actions {
        actions.push(executor.registry.get(name)?);
    }

    // `available_tools` and `decision_guide` are computed before the
    // system prompt resolves, since the template may reference either.
    // `messages` and `browser_state` round out the executor-injected
    // context set.
    let mut decorated_context = context.clone();
    if let Value::Object(ref mut map) = decorated_context {
        map.insert(
            "available_tools".to_string(),
            Value::String(prompt::available_tools_block(&actions, &tool_choice.stop_action)),
        );
        map.insert(
            "decision_guide".to_string(),
            Value::String(prompt::decision_guide_block(&actions)),
        );
        map.insert(
            "browser_state".to_string(),
            Value::String(executor.external.get_external_state_bundle().await),
        );
        map.entry("messages").or_insert(Value::Array(Vec::new()));
    }

    let system_prompt = executor
        .resolve_system_prompt(&step.system_prompt, &decorated_context, 0)
        .await?;
    let user_message = template::render(&step.message, &decorated_context)
        .map_err(|err| ExecutorError::Template(err.to_string()))?;

    let mut conversation = Conversation::new();
    conversation.push(Message::system(system_prompt));
    conversation.push(Message::user(user_message));

    let wire_tools = prompt::compile_tools(&actions);

    for _ in 0..tool_choice.max_iterations {
        // (a) Current-turn view: a shallow copy carrying the latest
        // external state, never mutating the persisted conversation.
        let mut view = conversation.to_view();
        let state = executor.external.get_external_state_bundle().await;
        prompt::insert_external_state(&mut view, state);

        // (b)
        let assistant = executor
            .cascade
            .generate(&view, step.intelligence.into(), RequestShape::Tools(wire_tools.clone()))
            .await?;

        let Message::Assistant { tool_calls, .. } = &assistant else {
            return Err(ExecutorError::Template(
                "cascade returned a non-assistant message".to_string(),
            ));
        };
        let tool_calls = tool_calls.clone();
        conversation.push(assistant);

        if tool_calls.is_empty() {
            // (c)
            conversation.push(Message::user(RETRY_REMINDER));
            conversation.prune(executor.config.prune_threshold, executor.config.prune_tail);
            continue;
        }

        // (d)
        if let Some(stop_result) =
            run_tool_calls(executor, &actions, &tool_choice.stop_action, &tool_calls, &mut conversation).await?
        {
            return Ok(stop_result);
        }

        // (e)
        conversation.prune(executor.config.prune_threshold, executor.config.prune_tail);
    }

    // 3. Iteration exhaustion: synthesize a stop-action call.
    synthesize_stop_call(executor, &tool_choice.stop_action, &conversation).await
}

/// Executes one assistant turn's tool calls in order. Stops at the
/// first failure — so the model sees only its own failure next turn,
/// not a pile of stale ones — or at the stop action. Returns
/// `Some(result)` the moment the stop action fires.
async fn run_tool_calls(
    executor: &Executor,
    actions: &[Arc<Action>],
    stop_action: &str,
    tool_calls: &[ToolCall],
    conversation: &mut Conversation,
) -> Result<Option<Value>, ExecutorError> {
    for call in tool_calls {
        let arguments: Value = match serde_json::from_str(&call.arguments) {
            Ok(value) => value,
            Err(err) => {
                conversation.push(Message::tool_result(
                    call.id.clone(),
                    json!({ "error": format!("arguments are not valid JSON: {err}") }).to_string(),
                ));
                break;
            }
        };

        let Some(action) = actions.iter().find(|candidate| candidate.name == call.name) else {
            conversation.push(Message::tool_result(
                call.id.clone(),
                json!({ "error": format!("action not found: {}", call.name) }).to_string(),
            ));
            break;
        };

        let mut projected = action.input_schema.project(&arguments);
        let is_stop = action.name == stop_action;
        if is_stop {
            if let Value::Object(ref mut map) = projected {
                map.insert(
                    "messages".to_string(),
                    serde_json::to_value(conversation.messages()).unwrap_or(Value::Null),
                );
            }
        }

        match executor.execute(&action.name, projected).await {
            Ok(result) => {
                if is_stop {
                    return Ok(Some(unwrap_stop_result(result)));
                }
                conversation.push(Message::tool_result(call.id.clone(), stringify_result(&result)));
            }
            Err(ExecutorError::Validation(validation)) => {
                conversation.push(Message::tool_result(
                    call.id.clone(),
                    json!({ "error": "Validation failed", "details": validation.messages }).to_string(),
                ));
                break;
            }
            Err(err) => {
                conversation.push(Message::tool_result(
                    call.id.clone(),
                    json!({ "error": err.to_string() }).to_string(),
                ));
                break;
            }
        }
    }

    Ok(None)
}

/// Iteration exhaustion: call `stop_action` once with a canned
/// "unable to complete" response plus the serialized conversation, and
/// return its unwrapped result.
async fn synthesize_stop_call(
    executor: &Executor,
    stop_action: &str,
    conversation: &Conversation,
) -> Result<Value, ExecutorError> {
    let action = executor.registry.get(stop_action)?;
    let canned = json!({
        "response": "Unable to complete the task within the allotted iterations.",
        "success": false,
        "messages": serde_json::to_value(conversation.messages()).unwrap_or(Value::Null),
    });
    let mut projected = action.input_schema.project(&canned);
    if let Value::Object(ref mut map) = projected {
        map.insert(
            "messages".to_string(),
            serde_json::to_value(conversation.messages()).unwrap_or(Value::Null),
        );
    }
    let result = executor.execute(&action.name, projected).await?;
    Ok(unwrap_stop_result(result))
}

/// The string value itself, else its `message` field, else its
/// `response` field, else its JSON serialization.
fn unwrap_stop_result(value: Value) -> Value {
    match value {
        Value::String(text) => Value::String(text),
        Value::Object(ref object) => object
            .get("message")
            .or_else(|| object.get("response"))
            .cloned()
            .unwrap_or(value),
        other => other,
    }
}

fn stringify_result(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
