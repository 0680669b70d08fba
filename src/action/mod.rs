//! Action declaration types: `Action`, `Step`, `ToolChoice`.
//!
//! Steps are a discriminated union — procedural, LLM-with-schema,
//! LLM-with-tool-choice, sub-action — matched by the executor rather
//! than dispatched through a trait object, since the capability set
//! per variant is fixed and known at compile time.

pub mod decl;
pub mod registry;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;

use crate::dependency::DependencyMap;
use crate::error::ExecutorError;
use crate::schema::Schema;

pub use decl::{action_from_json, register_procedure, ProcedureTable};
pub use registry::ActionRegistry;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Threaded into a procedural step alongside its params and the
/// previous step's result, carrying the dependency map a procedure may
/// read from via [`DependencyMap::get`]/[`DependencyMap::get_named`].
#[derive(Clone, Default)]
pub struct StepContext {
    pub dependencies: DependencyMap,
}

/// An opaque procedural step callable.
pub type ProcedureFn = Arc<
    dyn Fn(Value, Option<Value>, StepContext) -> BoxFuture<'static, Result<Value, ExecutorError>>
        + Send
        + Sync,
>;

/// Coarse knob selecting the cascade's starting tier. A thin newtype
/// over [`crate::cascade::IntelligenceLevel`] so action authors don't
/// need to depend on the cascade module directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intelligence {
    High,
    Medium,
    Low,
}

impl From<Intelligence> for crate::cascade::IntelligenceLevel {
    fn from(value: Intelligence) -> Self {
        match value {
            Intelligence::High => crate::cascade::IntelligenceLevel::High,
            Intelligence::Medium => crate::cascade::IntelligenceLevel::Medium,
            Intelligence::Low => crate::cascade::IntelligenceLevel::Low,
        }
    }
}

/// A system prompt that is itself an LLM-prompt-generator, recursively:
/// `SystemPromptSpec = Literal(string) | Generated(SystemPromptSpec,
/// message, intelligence)`. Resolution terminates at the first
/// `Literal`; depth is bounded by
/// `ExecutorConfig::meta_prompt_depth_cap` to rule out runaway or
/// cyclic generation chains.
#[derive(Clone)]
pub enum SystemPromptSpec {
    Literal(String),
    Generated(Box<MetaPrompt>),
}

impl SystemPromptSpec {
    pub fn literal(text: impl Into<String>) -> Self {
        SystemPromptSpec::Literal(text.into())
    }
}

#[derive(Clone)]
pub struct MetaPrompt {
    pub system_prompt: SystemPromptSpec,
    pub message: String,
    pub intelligence: Intelligence,
}

/// Declared inside an LLM step.
#[derive(Debug, Clone)]
pub struct ToolChoice {
    pub available_actions: Vec<String>,
    pub stop_action: String,
    pub max_iterations: u32,
}

impl ToolChoice {
    /// Enforces the declaration invariants: `stop_action` must be one
    /// of `available_actions`, and `max_iterations` must be at least 1.
    pub fn new(
        available_actions: Vec<String>,
        stop_action: impl Into<String>,
        max_iterations: u32,
    ) -> Result<Self, ExecutorError> {
        let stop_action = stop_action.into();
        if max_iterations < 1 {
            return Err(ExecutorError::InvalidMaxIterations(stop_action));
        }
        if !available_actions.iter().any(|name| name == &stop_action) {
            return Err(ExecutorError::StopActionNotAvailable {
                action: available_actions.join(", "),
                stop_action,
            });
        }
        Ok(Self {
            available_actions,
            stop_action,
            max_iterations,
        })
    }
}

pub struct LlmSchemaStep {
    pub system_prompt: SystemPromptSpec,
    pub message: String,
    pub intelligence: Intelligence,
    pub output_schema: Schema,
}

pub struct LlmToolChoiceStep {
    pub system_prompt: SystemPromptSpec,
    pub message: String,
    pub intelligence: Intelligence,
    pub tool_choice: ToolChoice,
}

pub struct ProcedureStep {
    pub name: String,
    pub run: ProcedureFn,
}

/// Parameter-mapping function for a sub-action step: `(params,
/// prev_result) -> mapped_params`.
pub type ParamMapFn = Arc<dyn Fn(&Value, Option<&Value>) -> Value + Send + Sync>;

pub struct SubActionStep {
    pub action: String,
    pub map_params: Option<ParamMapFn>,
}

/// One of: procedure, LLM-with-schema, LLM-with-tool-choice, sub-action.
pub enum Step {
    Procedure(ProcedureStep),
    LlmSchema(LlmSchemaStep),
    LlmToolChoice(LlmToolChoiceStep),
    SubAction(SubActionStep),
}

impl Step {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Step::Procedure(_) => "procedure",
            Step::LlmSchema(_) => "llm_schema",
            Step::LlmToolChoice(_) => "llm_tool_choice",
            Step::SubAction(_) => "sub_action",
        }
    }

    /// Every action name this step references: the sub-action it
    /// names directly, or every `available_actions` entry of a
    /// tool-choice step. Every name returned here must resolve in the
    /// registry.
    pub fn referenced_actions(&self) -> Vec<&str> {
        match self {
            Step::Procedure(_) | Step::LlmSchema(_) => Vec::new(),
            Step::LlmToolChoice(step) => step
                .tool_choice
                .available_actions
                .iter()
                .map(String::as_str)
                .collect(),
            Step::SubAction(step) => vec![step.action.as_str()],
        }
    }
}

/// Immutable declarative recipe: name, description, optional examples,
/// input schema, ordered step list.
pub struct Action {
    pub name: String,
    pub description: String,
    pub examples: Vec<String>,
    pub input_schema: Schema,
    pub steps: Vec<Step>,
}

impl Action {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Schema,
        steps: Vec<Step>,
    ) -> Result<Self, ExecutorError> {
        let name = name.into();
        if steps.is_empty() {
            return Err(ExecutorError::InvalidAction(format!(
                "action `{name}` must declare at least one step"
            )));
        }
        Ok(Self {
            name,
            description: description.into(),
            examples: Vec::new(),
            input_schema,
            steps,
        })
    }

    pub fn with_examples(mut self, examples: Vec<String>) -> Self {
        self.examples = examples;
        self
    }
}
