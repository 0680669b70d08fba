//! OpenAI-compatible chat-completions wire protocol.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::conversation::{Message, Role, ToolCall};
use crate::error::ProviderError;

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<WireTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderHint>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderHint {
    pub only: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WireMessage {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<WireToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireToolCall {
    pub id: String,
    #[serde(rename = "type", default = "function_type")]
    pub kind: String,
    pub function: WireFunctionCall,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireFunctionCall {
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct WireTool {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub function: WireFunctionDef,
}

#[derive(Debug, Clone, Serialize)]
pub struct WireFunctionDef {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl WireTool {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            kind: "function",
            function: WireFunctionDef {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }
}

/// Name of the single synthetic tool used in single-schema mode.
pub const RESPOND_TOOL_NAME: &str = "respond";

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: WireMessage,
}

pub fn to_wire_messages(view: &[Message]) -> Vec<WireMessage> {
    view.iter()
        .map(|message| match message {
            Message::System { content } => WireMessage {
                role: "system".to_string(),
                content: Some(content.clone()),
                ..Default::default()
            },
            Message::User { content } => WireMessage {
                role: "user".to_string(),
                content: Some(content.clone()),
                ..Default::default()
            },
            Message::Assistant { content, tool_calls } => WireMessage {
                role: "assistant".to_string(),
                content: content.clone(),
                tool_calls: tool_calls
                    .iter()
                    .map(|call| WireToolCall {
                        id: call.id.clone(),
                        kind: "function".to_string(),
                        function: WireFunctionCall {
                            name: call.name.clone(),
                            arguments: call.arguments.clone(),
                        },
                    })
                    .collect(),
                ..Default::default()
            },
            Message::Tool { tool_call_id, content } => WireMessage {
                role: "tool".to_string(),
                content: Some(content.clone()),
                tool_call_id: Some(tool_call_id.clone()),
                ..Default::default()
            },
        })
        .collect()
}

/// Parses the wire assistant message into a [`Message::Assistant`],
/// enforcing that if `tool_calls` exist the first one carries a
/// non-empty `function.name`.
pub fn from_wire_assistant(endpoint: &str, message: WireMessage) -> Result<Message, ProviderError> {
    if message.role != "assistant" {
        return Err(ProviderError::MalformedResponse {
            endpoint: endpoint.to_string(),
            detail: format!("expected assistant message, got role `{}`", message.role),
        });
    }

    if let Some(first) = message.tool_calls.first() {
        if first.function.name.is_empty() {
            return Err(ProviderError::MalformedResponse {
                endpoint: endpoint.to_string(),
                detail: "tool call is missing function.name".to_string(),
            });
        }
    }

    let tool_calls = message
        .tool_calls
        .into_iter()
        .map(|call| ToolCall {
            id: call.id,
            name: call.function.name,
            arguments: call.function.arguments,
        })
        .collect();

    Ok(Message::assistant_tool_calls(message.content, tool_calls))
}

pub fn role_name(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_choices_round_trip_rejected_by_caller() {
        let response: ChatResponse = serde_json::from_value(json!({"choices": []})).unwrap();
        assert!(response.choices.is_empty());
    }

    #[test]
    fn missing_function_name_is_malformed() {
        let message = WireMessage {
            role: "assistant".to_string(),
            content: None,
            tool_calls: vec![WireToolCall {
                id: "1".into(),
                kind: "function".into(),
                function: WireFunctionCall {
                    name: String::new(),
                    arguments: "{}".into(),
                },
            }],
            tool_call_id: None,
        };
        let err = from_wire_assistant("ep", message).unwrap_err();
        assert!(matches!(err, ProviderError::MalformedResponse { .. }));
    }

    #[test]
    fn tool_calls_survive_round_trip() {
        let message = WireMessage {
            role: "assistant".to_string(),
            content: Some("thinking".to_string()),
            tool_calls: vec![WireToolCall {
                id: "call_1".into(),
                kind: "function".into(),
                function: WireFunctionCall {
                    name: "ping".into(),
                    arguments: "{}".into(),
                },
            }],
            tool_call_id: None,
        };
        let parsed = from_wire_assistant("ep", message).unwrap();
        let Message::Assistant { content, tool_calls } = parsed else {
            panic!("expected assistant message");
        };
        assert_eq!(content.as_deref(), Some("thinking"));
        assert_eq!(tool_calls[0].name, "ping");
    }
}
