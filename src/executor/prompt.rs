//! Prompt decoration — compiling actions into wire tools, building the
//! `available_tools`/`decision_guide` blocks — and the synthetic
//! external-state message.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use crate::action::Action;
use crate::cascade::WireTool;
use crate::conversation::Message;
use crate::schema::{PrimitiveType, PropertySchema, Schema};

/// `justification` and `instructions` are appended to every compiled
/// tool's schema as mandatory fields: each action becomes a tool whose
/// parameters are its `input_schema.properties` augmented with these
/// two string fields, with the required-set merging in the same.
fn augmented_schema(action: &Action) -> Schema {
    let mut properties: BTreeMap<String, PropertySchema> = action.input_schema.properties.clone();
    properties.insert(
        "justification".to_string(),
        PropertySchema {
            kind: PrimitiveType::String,
            description: "Why this tool call is being made right now.".to_string(),
            r#enum: None,
            items: None,
        },
    );
    properties.insert(
        "instructions".to_string(),
        PropertySchema {
            kind: PrimitiveType::String,
            description: "Specific instructions for carrying out this action.".to_string(),
            r#enum: None,
            items: None,
        },
    );

    let mut required = action.input_schema.required.clone();
    for mandatory in ["justification", "instructions"] {
        if !required.iter().any(|field| field == mandatory) {
            required.push(mandatory.to_string());
        }
    }

    Schema {
        kind: "object".to_string(),
        properties,
        required,
        additional_properties: action.input_schema.additional_properties,
    }
}

/// Compiles one action into the `{type: "function", function: {...}}`
/// tool shape.
pub fn compile_tool(action: &Action) -> WireTool {
    WireTool::new(
        action.name.clone(),
        action.description.clone(),
        augmented_schema(action).to_json(),
    )
}

pub fn compile_tools(actions: &[Arc<Action>]) -> Vec<WireTool> {
    actions.iter().map(|action| compile_tool(action)).collect()
}

/// A numbered `name [STOP?]: description` list with a per-tool
/// *Requires* footer listing required fields.
pub fn available_tools_block(actions: &[Arc<Action>], stop_action: &str) -> String {
    let mut lines = Vec::new();
    for (index, action) in actions.iter().enumerate() {
        let marker = if action.name == stop_action { " [STOP]" } else { "" };
        lines.push(format!(
            "{}. {}{}: {}",
            index + 1,
            action.name,
            marker,
            action.description
        ));
        if !action.input_schema.required.is_empty() {
            lines.push(format!(
                "   Requires: {}",
                action.input_schema.required.join(", ")
            ));
        }
    }
    lines.join("\n")
}

/// `- "<example>" → <action_name>` lines gathered from every available
/// action's examples.
pub fn decision_guide_block(actions: &[Arc<Action>]) -> String {
    let mut lines = Vec::new();
    for action in actions {
        for example in &action.examples {
            lines.push(format!("- \"{example}\" → {}", action.name));
        }
    }
    lines.join("\n")
}

/// Inserts the synthetic external-state message directly before the
/// last user-role message, or appends it if none exists. Operates on a
/// view, never the persisted conversation.
pub fn insert_external_state(view: &mut Vec<Message>, state_bundle: String) {
    let state_message = Message::user(state_bundle);
    match view.iter().rposition(|message| matches!(message, Message::User { .. })) {
        Some(index) => view.insert(index, state_message),
        None => view.push(state_message),
    }
}

/// Merges an action's declared input parameters with the previous
/// step's result fields into one template-rendering context: every
/// template variable must be derivable from either the action's
/// declared input parameters or the previous step's result fields.
pub fn merge_template_context(params: &Value, prev_result: Option<&Value>) -> Value {
    let mut merged = serde_json::Map::new();
    if let Some(object) = params.as_object() {
        merged.extend(object.clone());
    }
    if let Some(object) = prev_result.and_then(Value::as_object) {
        merged.extend(object.clone());
    }
    Value::Object(merged)
}
