//! Parses a persisted, JSON-encoded action declaration into an
//! `Action`. Procedural steps are code-embedded rather than
//! data-driven, so a `{"type": "procedure", "name": "..."}` step entry
//! is resolved against a caller-supplied name-to-callable table
//! instead of being parsed from the declaration itself.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::ExecutorError;
use crate::schema::Schema;

use super::{
    Action, Intelligence, LlmSchemaStep, LlmToolChoiceStep, ParamMapFn, ProcedureFn, ProcedureStep,
    Step, SubActionStep, SystemPromptSpec, ToolChoice,
};

/// Table of named procedural callables an action declaration may
/// reference by name. Populated by the embedding application; this
/// crate has no registry of its own since procedures are opaque code.
pub type ProcedureTable = HashMap<String, ProcedureFn>;

/// Parses one action declaration (a JSON object with `name`,
/// `description`, optional `examples`, `input_schema`, and `steps`)
/// into an `Action`, resolving any `procedure` step against
/// `procedures`.
pub fn action_from_json(value: &Value, procedures: &ProcedureTable) -> Result<Action, ExecutorError> {
    let object = value
        .as_object()
        .ok_or_else(|| ExecutorError::InvalidAction("action declaration must be a JSON object".to_string()))?;

    let name = object
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| ExecutorError::InvalidAction("action declaration missing `name`".to_string()))?
        .to_string();

    let description = object
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let examples = object
        .get("examples")
        .and_then(Value::as_array)
        .map(|values| values.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();

    let input_schema = match object.get("input_schema") {
        Some(schema_value) => Schema::from_json(schema_value)?,
        None => Schema::empty(),
    };

    let steps_value = object
        .get("steps")
        .and_then(Value::as_array)
        .ok_or_else(|| ExecutorError::InvalidAction(format!("action `{name}` declaration missing `steps`")))?;

    let mut steps = Vec::with_capacity(steps_value.len());
    for step_value in steps_value {
        steps.push(step_from_json(&name, step_value, procedures)?);
    }

    Ok(Action::new(name, description, input_schema, steps)?.with_examples(examples))
}

fn step_from_json(action_name: &str, value: &Value, procedures: &ProcedureTable) -> Result<Step, ExecutorError> {
    let object = value
        .as_object()
        .ok_or_else(|| ExecutorError::InvalidAction(format!("action `{action_name}` has a non-object step declaration")))?;
    let kind = object.get("type").and_then(Value::as_str).unwrap_or("procedure");

    match kind {
        "procedure" => procedure_step_from_json(action_name, object, procedures),
        "sub_action" => sub_action_step_from_json(action_name, object),
        "llm" => llm_step_from_json(action_name, object),
        other => Err(ExecutorError::InvalidAction(format!(
            "action `{action_name}` has a step of unknown type `{other}`"
        ))),
    }
}

fn procedure_step_from_json(
    action_name: &str,
    object: &serde_json::Map<String, Value>,
    procedures: &ProcedureTable,
) -> Result<Step, ExecutorError> {
    let proc_name = object
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| ExecutorError::InvalidAction(format!("action `{action_name}` has a procedure step missing `name`")))?;
    let run = procedures.get(proc_name).cloned().ok_or_else(|| {
        ExecutorError::InvalidAction(format!(
            "action `{action_name}` references unregistered procedure `{proc_name}`"
        ))
    })?;
    Ok(Step::Procedure(ProcedureStep {
        name: proc_name.to_string(),
        run,
    }))
}

fn sub_action_step_from_json(action_name: &str, object: &serde_json::Map<String, Value>) -> Result<Step, ExecutorError> {
    let sub_action = object
        .get("action")
        .and_then(Value::as_str)
        .ok_or_else(|| ExecutorError::InvalidAction(format!("action `{action_name}` has a sub_action step missing `action`")))?
        .to_string();
    // Param mapping for a declared sub-action step is always the
    // identity: a declaration has no way to express arbitrary Rust
    // closures, so reshaping params needs a code-embedded Step.
    let map_params: Option<ParamMapFn> = None;
    Ok(Step::SubAction(SubActionStep {
        action: sub_action,
        map_params,
    }))
}

fn llm_step_from_json(action_name: &str, object: &serde_json::Map<String, Value>) -> Result<Step, ExecutorError> {
    let system_prompt = object
        .get("system_prompt")
        .ok_or_else(|| ExecutorError::InvalidAction(format!("action `{action_name}` has an llm step missing `system_prompt`")))
        .and_then(system_prompt_from_json)?;
    let message = object
        .get("message")
        .and_then(Value::as_str)
        .ok_or_else(|| ExecutorError::InvalidAction(format!("action `{action_name}` has an llm step missing `message`")))?
        .to_string();
    let intelligence = intelligence_from_json(action_name, object.get("intelligence"))?;

    let output_schema = match object.get("output_schema") {
        Some(schema_value) => Some(Schema::from_json(schema_value)?),
        None => None,
    };
    let tool_choice = match object.get("tool_choice") {
        Some(tool_choice_value) => Some(tool_choice_from_json(tool_choice_value)?),
        None => None,
    };

    build_llm_step(action_name, system_prompt, message, intelligence, output_schema, tool_choice)
}

/// Enforces the "exactly one of `output_schema` and `tool_choice`"
/// invariant an LLM step declaration is supposed to satisfy. A JSON
/// declaration can say both or neither, which the typed `Step` enum
/// can't represent — this is where that ambiguity actually surfaces.
fn build_llm_step(
    action_name: &str,
    system_prompt: SystemPromptSpec,
    message: String,
    intelligence: Intelligence,
    output_schema: Option<Schema>,
    tool_choice: Option<ToolChoice>,
) -> Result<Step, ExecutorError> {
    match (output_schema, tool_choice) {
        (Some(_), Some(_)) => Err(ExecutorError::AmbiguousOutputMode(action_name.to_string())),
        (None, None) => Err(ExecutorError::MissingOutputMode(action_name.to_string())),
        (Some(output_schema), None) => Ok(Step::LlmSchema(LlmSchemaStep {
            system_prompt,
            message,
            intelligence,
            output_schema,
        })),
        (None, Some(tool_choice)) => Ok(Step::LlmToolChoice(LlmToolChoiceStep {
            system_prompt,
            message,
            intelligence,
            tool_choice,
        })),
    }
}

fn system_prompt_from_json(value: &Value) -> Result<SystemPromptSpec, ExecutorError> {
    match value {
        Value::String(text) => Ok(SystemPromptSpec::Literal(text.clone())),
        Value::Object(object) => {
            let inner = object
                .get("system_prompt")
                .ok_or_else(|| ExecutorError::InvalidAction("meta-prompt declaration missing `system_prompt`".to_string()))?;
            let nested = system_prompt_from_json(inner)?;
            let message = object
                .get("message")
                .and_then(Value::as_str)
                .ok_or_else(|| ExecutorError::InvalidAction("meta-prompt declaration missing `message`".to_string()))?
                .to_string();
            let intelligence = intelligence_from_json("<meta-prompt>", object.get("intelligence"))?;
            Ok(SystemPromptSpec::Generated(Box::new(super::MetaPrompt {
                system_prompt: nested,
                message,
                intelligence,
            })))
        }
        _ => Err(ExecutorError::InvalidAction(
            "system_prompt must be a string or a meta-prompt object".to_string(),
        )),
    }
}

fn intelligence_from_json(action_name: &str, value: Option<&Value>) -> Result<Intelligence, ExecutorError> {
    match value.and_then(Value::as_str) {
        Some("HIGH") => Ok(Intelligence::High),
        Some("MEDIUM") => Ok(Intelligence::Medium),
        Some("LOW") => Ok(Intelligence::Low),
        Some(other) => Err(ExecutorError::InvalidAction(format!(
            "action `{action_name}` declares an unknown intelligence level `{other}`"
        ))),
        None => Err(ExecutorError::InvalidAction(format!(
            "action `{action_name}` is missing `intelligence`"
        ))),
    }
}

fn tool_choice_from_json(value: &Value) -> Result<ToolChoice, ExecutorError> {
    let object = value
        .as_object()
        .ok_or_else(|| ExecutorError::InvalidAction("tool_choice must be a JSON object".to_string()))?;
    let available_actions = object
        .get("available_actions")
        .and_then(Value::as_array)
        .map(|values| values.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();
    let stop_action = object
        .get("stop_action")
        .and_then(Value::as_str)
        .ok_or_else(|| ExecutorError::InvalidAction("tool_choice declaration missing `stop_action`".to_string()))?
        .to_string();
    let max_iterations = object
        .get("max_iterations")
        .and_then(Value::as_u64)
        .ok_or_else(|| ExecutorError::InvalidAction("tool_choice declaration missing `max_iterations`".to_string()))?
        as u32;

    ToolChoice::new(available_actions, stop_action, max_iterations)
}

/// Registers one named procedure into a [`ProcedureTable`], for
/// callers assembling the table before parsing a batch of
/// declarations.
pub fn register_procedure(table: &mut ProcedureTable, name: impl Into<String>, run: ProcedureFn) {
    table.insert(name.into(), run);
}
