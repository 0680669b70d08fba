//! `verify_model`: a one-token probe request against a trivial `test`
//! tool, applying the tool-choice negotiation rule so a newly
//! configured cascade entry can be checked (and, if needed, flagged
//! `no_tool_choice`) before it is trusted with real traffic.

use reqwest::Client;

use super::endpoint::EndpointStore;
use super::wire::{self, ChatRequest, ProviderHint, WireTool};
use crate::conversation::Message;
use crate::error::ProviderError;

use std::time::Duration;

const PROBE_TIMEOUT: Duration = Duration::from_secs(40);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyResult {
    pub valid: bool,
    pub error: Option<String>,
    /// `Some(true)` when the retry without `tool_choice` succeeded,
    /// `Some(false)` when the first probe succeeded outright, `None`
    /// when verification failed entirely.
    pub no_tool_choice: Option<bool>,
}

fn probe_tool() -> WireTool {
    WireTool::new(
        "test",
        "A trivial probe tool used only to verify tool-calling support.",
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": [],
            "additionalProperties": false
        }),
    )
}

/// Case-insensitive substring check on the provider's error detail:
/// `"tool_choice"`, `"tool choice"`, or both `"tool"` and `"not
/// supported"`.
fn looks_like_tool_choice_unsupported(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("tool_choice")
        || lower.contains("tool choice")
        || (lower.contains("tool") && lower.contains("not supported"))
}

async fn send_probe(
    http: &Client,
    endpoints: &EndpointStore,
    endpoint_id: &str,
    model: &str,
    provider_hints: &[String],
    require_tool_choice: bool,
) -> Result<Message, ProviderError> {
    let endpoint = endpoints
        .get(endpoint_id)
        .ok_or_else(|| ProviderError::Request {
            endpoint: endpoint_id.to_string(),
            message: "endpoint id is not configured".to_string(),
        })?;

    let request = ChatRequest {
        model: model.to_string(),
        messages: wire::to_wire_messages(&[Message::user("respond")]),
        tools: Some(vec![probe_tool()]),
        tool_choice: require_tool_choice.then_some("required"),
        provider: provider_hints
            .first()
            .cloned()
            .map(|hint| ProviderHint { only: vec![hint] }),
    };

    super::send_chat_request(http, endpoint, &request, PROBE_TIMEOUT).await
}

/// Verifies a model is reachable and tool-calling-capable, negotiating
/// away `tool_choice: required` if the provider rejects it.
pub async fn verify_model(
    http: &Client,
    endpoints: &EndpointStore,
    endpoint_id: &str,
    model: &str,
    provider_hints: &[String],
) -> VerifyResult {
    match send_probe(http, endpoints, endpoint_id, model, provider_hints, true).await {
        Ok(_) => VerifyResult {
            valid: true,
            error: None,
            no_tool_choice: Some(false),
        },
        Err(err) => {
            let message = err.to_string();
            if !looks_like_tool_choice_unsupported(&message) {
                return VerifyResult {
                    valid: false,
                    error: Some(message),
                    no_tool_choice: None,
                };
            }

            match send_probe(http, endpoints, endpoint_id, model, provider_hints, false).await {
                Ok(_) => VerifyResult {
                    valid: true,
                    error: None,
                    no_tool_choice: Some(true),
                },
                Err(retry_err) => VerifyResult {
                    valid: false,
                    error: Some(retry_err.to_string()),
                    no_tool_choice: None,
                },
            }
        }
    }
}
