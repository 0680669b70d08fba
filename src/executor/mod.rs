//! The executor: validates parameters, walks one action's step list,
//! and dispatches each step by its tagged variant. The multi-turn loop
//! itself lives in [`loop_`]; prompt decoration lives in [`prompt`].

pub mod loop_;
pub mod prompt;

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::time::timeout;

use crate::action::{
    Action, ActionRegistry, MetaPrompt, Step, StepContext, SystemPromptSpec,
};
use crate::cascade::{CascadeClient, RequestShape};
use crate::dependency::DependencyMap;
use crate::error::{ExecutorError, TimeoutError};
use crate::external::{ExternalCollaborator, NoExternalCollaborator};
use crate::schema::Schema;
use crate::template;

/// Per-step budget.
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(20);
/// Conversation length past which the multi-turn loop collapses
/// intermediate messages. Below this threshold, pruning is a no-op.
pub const DEFAULT_PRUNE_THRESHOLD: usize = 12;
/// How many trailing messages survive a prune, alongside the system
/// message and the first user message.
pub const DEFAULT_PRUNE_TAIL: usize = 6;
/// Bound on meta-prompt recursion depth, since depth is otherwise
/// bounded only by configuration.
pub const DEFAULT_META_PROMPT_DEPTH_CAP: usize = 4;

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub step_timeout: Duration,
    pub prune_threshold: usize,
    pub prune_tail: usize,
    pub meta_prompt_depth_cap: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            step_timeout: DEFAULT_STEP_TIMEOUT,
            prune_threshold: DEFAULT_PRUNE_THRESHOLD,
            prune_tail: DEFAULT_PRUNE_TAIL,
            meta_prompt_depth_cap: DEFAULT_META_PROMPT_DEPTH_CAP,
        }
    }
}

/// Schema used for both "plain" `output_schema` LLM steps with no
/// schema of their own to fall back on and for meta-prompt resolution:
/// a single required `text` field carrying the model's response.
fn meta_prompt_schema() -> Schema {
    let mut schema = Schema::empty();
    schema.properties.insert(
        "text".to_string(),
        crate::schema::PropertySchema {
            kind: crate::schema::PrimitiveType::String,
            description: "The resolved prompt text.".to_string(),
            r#enum: None,
            items: None,
        },
    );
    schema.required.push("text".to_string());
    schema
}

pub struct ExecutorBuilder {
    registry: Option<Arc<ActionRegistry>>,
    cascade: Option<Arc<CascadeClient>>,
    external: Arc<dyn ExternalCollaborator>,
    dependencies: DependencyMap,
    dependency_overrides: DependencyMap,
    config: ExecutorConfig,
}

impl Default for ExecutorBuilder {
    fn default() -> Self {
        Self {
            registry: None,
            cascade: None,
            external: Arc::new(NoExternalCollaborator),
            dependencies: DependencyMap::new(),
            dependency_overrides: DependencyMap::new(),
            config: ExecutorConfig::default(),
        }
    }
}

impl ExecutorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(mut self, registry: Arc<ActionRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn cascade(mut self, cascade: Arc<CascadeClient>) -> Self {
        self.cascade = Some(cascade);
        self
    }

    pub fn external(mut self, external: Arc<dyn ExternalCollaborator>) -> Self {
        self.external = external;
        self
    }

    pub fn dependency<T>(self, value: T) -> Self
    where
        T: Send + Sync + 'static,
    {
        self.dependencies.insert(value);
        self
    }

    /// Registers a value that wins over any same-typed `dependency()`
    /// entry once [`Executor::execute`] actually runs a procedural
    /// step, via [`DependencyMap::merged_with`]. Handy for swapping a
    /// real dependency out for a test double without touching the
    /// base registration.
    pub fn dependency_override<T>(self, value: T) -> Self
    where
        T: Send + Sync + 'static,
    {
        self.dependency_overrides.insert(value);
        self
    }

    pub fn dependency_override_named<T>(self, key: impl Into<String>, value: T) -> Self
    where
        T: Send + Sync + 'static,
    {
        self.dependency_overrides.insert_named(key, value);
        self
    }

    pub fn config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn step_timeout(mut self, timeout: Duration) -> Self {
        self.config.step_timeout = timeout;
        self
    }

    pub fn build(self) -> Result<Executor, ExecutorError> {
        let registry = self.registry.ok_or_else(|| {
            ExecutorError::InvalidAction(
                "executor requires a registry via ExecutorBuilder::registry(...)".to_string(),
            )
        })?;
        let cascade = self.cascade.ok_or_else(|| {
            ExecutorError::InvalidAction(
                "executor requires a cascade client via ExecutorBuilder::cascade(...)".to_string(),
            )
        })?;

        Ok(Executor {
            registry,
            cascade,
            external: self.external,
            dependencies: self.dependencies,
            dependency_overrides: self.dependency_overrides,
            config: self.config,
        })
    }
}

/// Executes actions to completion. One `Executor` is shared across
/// concurrently in-flight invocations: it carries no mutable state of
/// its own beyond what it hands to the cascade client.
pub struct Executor {
    pub(crate) registry: Arc<ActionRegistry>,
    pub(crate) cascade: Arc<CascadeClient>,
    pub(crate) external: Arc<dyn ExternalCollaborator>,
    pub(crate) dependencies: DependencyMap,
    pub(crate) dependency_overrides: DependencyMap,
    pub(crate) config: ExecutorConfig,
}

impl Executor {
    pub fn builder() -> ExecutorBuilder {
        ExecutorBuilder::new()
    }

    pub fn registry(&self) -> &Arc<ActionRegistry> {
        &self.registry
    }

    pub fn cascade(&self) -> &Arc<CascadeClient> {
        &self.cascade
    }

    /// Executes one action to completion:
    /// ```text
    /// execute(action, params):
    ///   validate(params, action.input_schema)
    ///   result <- null
    ///   for step in action.steps:
    ///       result <- execute_step(step, params, result, within STEP_TIMEOUT)
    ///   return result
    /// ```
    #[tracing::instrument(skip(self, params), fields(action = %action_name))]
    pub async fn execute(&self, action_name: &str, params: Value) -> Result<Value, ExecutorError> {
        let action = self.registry.get(action_name)?;
        action.input_schema.validate(&params)?;

        let mut result: Option<Value> = None;
        for (index, step) in action.steps.iter().enumerate() {
            result = Some(
                self.execute_step(&action, step, &params, result.as_ref())
                    .await
                    .map_err(|source| ExecutorError::Step {
                        action: action.name.clone(),
                        step: index,
                        step_kind: step.kind_name().to_string(),
                        source: Box::new(source),
                    })?,
            );
        }

        Ok(result.unwrap_or(Value::Null))
    }

    async fn execute_step(
        &self,
        action: &Action,
        step: &Step,
        params: &Value,
        prev_result: Option<&Value>,
    ) -> Result<Value, ExecutorError> {
        match step {
            Step::Procedure(procedure) => {
                let ctx = StepContext {
                    dependencies: self.dependencies.merged_with(&self.dependency_overrides),
                };
                let fut = (procedure.run)(params.clone(), prev_result.cloned(), ctx);
                timeout(self.config.step_timeout, fut)
                    .await
                    .map_err(|_| {
                        ExecutorError::Timeout(TimeoutError::Step {
                            step: procedure.name.clone(),
                            budget_secs: self.config.step_timeout.as_secs(),
                        })
                    })?
            }
            Step::LlmSchema(llm_step) => {
                let context = prompt::merge_template_context(params, prev_result);
                let fut = self.run_llm_schema_step(llm_step, &context);
                timeout(self.config.step_timeout, fut).await.map_err(|_| {
                    ExecutorError::Timeout(TimeoutError::Step {
                        step: "llm_schema".to_string(),
                        budget_secs: self.config.step_timeout.as_secs(),
                    })
                })?
            }
            Step::LlmToolChoice(llm_step) => {
                let context = prompt::merge_template_context(params, prev_result);
                loop_::run(self, llm_step, &context).await
            }
            Step::SubAction(sub_action) => {
                let mapped = match &sub_action.map_params {
                    Some(map) => (map)(params, prev_result),
                    None => params.clone(),
                };
                self.execute(&sub_action.action, mapped).await
            }
        }
    }

    async fn run_llm_schema_step(
        &self,
        step: &crate::action::LlmSchemaStep,
        context: &Value,
    ) -> Result<Value, ExecutorError> {
        let system_prompt = self.resolve_system_prompt(&step.system_prompt, context, 0).await?;
        let user_message = template::render(&step.message, context)
            .map_err(|err| ExecutorError::Template(err.to_string()))?;

        let mut view = vec![
            crate::conversation::Message::system(system_prompt),
            crate::conversation::Message::user(user_message),
        ];
        let state = self.external.get_external_state_bundle().await;
        prompt::insert_external_state(&mut view, state);

        let assistant = self
            .cascade
            .generate(&view, step.intelligence.into(), RequestShape::Schema(step.output_schema.clone()))
            .await?;

        extract_single_tool_result(&assistant)
    }

    /// Resolves a `SystemPromptSpec`, recursing through `Generated`
    /// meta-prompts by calling the cascade with the sub-prompt to
    /// produce a string that becomes the actual system prompt.
    /// Terminates at the first `Literal`; bounded by
    /// `ExecutorConfig::meta_prompt_depth_cap`.
    #[allow(clippy::only_used_in_recursion)]
    pub(crate) fn resolve_system_prompt<'a>(
        &'a self,
        spec: &'a SystemPromptSpec,
        context: &'a Value,
        depth: usize,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<String, ExecutorError>> + Send + 'a>>
    {
        Box::pin(async move {
            if depth > self.config.meta_prompt_depth_cap {
                return Err(ExecutorError::MetaPromptDepth(self.config.meta_prompt_depth_cap));
            }

            match spec {
                SystemPromptSpec::Literal(text) => template::render(text, context)
                    .map_err(|err| ExecutorError::Template(err.to_string())),
                SystemPromptSpec::Generated(meta) => {
                    self.run_meta_prompt(meta, context, depth).await
                }
            }
        })
    }

    async fn run_meta_prompt(
        &self,
        meta: &MetaPrompt,
        context: &Value,
        depth: usize,
    ) -> Result<String, ExecutorError> {
        let system_prompt = self
            .resolve_system_prompt(&meta.system_prompt, context, depth + 1)
            .await?;
        let user_message = template::render(&meta.message, context)
            .map_err(|err| ExecutorError::Template(err.to_string()))?;

        let view = vec![
            crate::conversation::Message::system(system_prompt),
            crate::conversation::Message::user(user_message),
        ];

        let assistant = self
            .cascade
            .generate(&view, meta.intelligence.into(), RequestShape::Schema(meta_prompt_schema()))
            .await?;

        let result = extract_single_tool_result(&assistant)?;
        result
            .get("text")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ExecutorError::Template("meta-prompt response missing `text`".to_string()))
    }
}

/// Parses the sole tool call's JSON arguments out of an assistant
/// message produced in single-schema mode, where the cascade is asked
/// for exactly one tool call carrying the step's output schema.
fn extract_single_tool_result(message: &crate::conversation::Message) -> Result<Value, ExecutorError> {
    let crate::conversation::Message::Assistant { tool_calls, .. } = message else {
        return Err(ExecutorError::Template(
            "cascade returned a non-assistant message".to_string(),
        ));
    };
    let call = tool_calls.first().ok_or_else(|| {
        ExecutorError::Template("cascade response carried no tool call".to_string())
    })?;
    serde_json::from_str(&call.arguments)
        .map_err(|err| ExecutorError::Parse(crate::error::ParseError(err.to_string())).into())
}
