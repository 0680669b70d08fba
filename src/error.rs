use thiserror::Error;

/// Raised by the parameter validator. Carries every mismatch found,
/// not just the first, so a caller — or a model reading the fed-back
/// tool error — can fix every field in one turn.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("validation failed: {}", .messages.join("; "))]
pub struct ValidationError {
    pub messages: Vec<String>,
}

impl ValidationError {
    pub fn single(message: impl Into<String>) -> Self {
        Self {
            messages: vec![message.into()],
        }
    }
}

/// Malformed `Schema` declaration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("schema must be a JSON object")]
    NotAnObject,
    #[error("schema root must declare type=object")]
    RootTypeMustBeObject,
    #[error("schema `required` must be an array of strings")]
    InvalidRequired,
    #[error("unsupported primitive type: {0}")]
    UnsupportedType(String),
}

/// An action name referenced by a step, a `stop_action`, or an
/// `available_actions` entry does not resolve in the registry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("action not found: {0}")]
pub struct NotFoundError(pub String);

/// A step or model call exceeded its budget.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TimeoutError {
    #[error("step `{step}` exceeded the {budget_secs}s step timeout")]
    Step { step: String, budget_secs: u64 },
    #[error("model call exceeded the {budget_secs}s llm timeout")]
    Llm { budget_secs: u64 },
}

/// A tool call's `arguments` string failed to parse as JSON. Never
/// escapes a multi-turn loop — it is always fed back to the model as a
/// tool-response message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("tool call arguments are not valid JSON: {0}")]
pub struct ParseError(pub String);

/// Every non-2xx/malformed-response failure the cascade can surface
/// once both passes are exhausted.
#[derive(Debug, Error, Clone)]
pub enum ProviderError {
    #[error("request to {endpoint} failed: {message}")]
    Request { endpoint: String, message: String },
    #[error("request to {endpoint} exceeded the {budget_secs}s llm timeout")]
    Timeout { endpoint: String, budget_secs: u64 },
    #[error("provider {endpoint} returned {status}: {detail}")]
    Status {
        endpoint: String,
        status: u16,
        detail: String,
    },
    #[error("provider {endpoint} returned a malformed response: {detail}")]
    MalformedResponse { endpoint: String, detail: String },
    #[error("every cascade entry failed in both the primary and fallback pass: {last_error}")]
    Exhausted {
        last_error: String,
        last_was_timeout: bool,
        budget_secs: u64,
    },
}

/// Top-level error surfaced by the executor outside of a multi-turn
/// loop. Inside a loop, `Validation`, `NotFound`, `Parse`, and
/// per-call `Timeout` against a sub-action are instead converted into
/// tool-response messages — see [`crate::executor::loop_`].
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    NotFound(#[from] NotFoundError),
    #[error(transparent)]
    Timeout(#[from] TimeoutError),
    #[error(transparent)]
    Provider(ProviderError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("step {step} (`{step_kind}`) of action `{action}` failed: {source}")]
    Step {
        action: String,
        step: usize,
        step_kind: String,
        #[source]
        source: Box<ExecutorError>,
    },
    #[error("procedural step failed: {0}")]
    Procedure(String),
    #[error("action `{0}` declares an LLM step with both output_schema and tool_choice")]
    AmbiguousOutputMode(String),
    #[error("invalid action declaration: {0}")]
    InvalidAction(String),
    #[error("action `{0}` declares an LLM step with neither output_schema nor tool_choice")]
    MissingOutputMode(String),
    #[error(
        "stop_action `{stop_action}` is not present in available_actions for action `{action}`"
    )]
    StopActionNotAvailable { action: String, stop_action: String },
    #[error("max_iterations must be >= 1 (action `{0}`)")]
    InvalidMaxIterations(String),
    #[error("template variable resolution failed: {0}")]
    Template(String),
    #[error("meta-prompt recursion exceeded the depth cap ({0})")]
    MetaPromptDepth(usize),
}

impl From<SchemaError> for ExecutorError {
    fn from(err: SchemaError) -> Self {
        ExecutorError::Validation(ValidationError::single(err.to_string()))
    }
}

/// A single-entry timeout, or a cascade exhausted entirely by
/// timeouts, surfaces as `Timeout(TimeoutError::Llm)` instead of the
/// generic `Provider` wrapping every other cascade failure gets.
impl From<ProviderError> for ExecutorError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Timeout { budget_secs, .. } => {
                ExecutorError::Timeout(TimeoutError::Llm { budget_secs })
            }
            ProviderError::Exhausted {
                last_was_timeout: true,
                budget_secs,
                ..
            } => ExecutorError::Timeout(TimeoutError::Llm { budget_secs }),
            other => ExecutorError::Provider(other),
        }
    }
}
