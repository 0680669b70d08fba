//! # action-orchestrator
//!
//! **A declarative interpreter for agentic action execution.** Given a
//! user utterance, an [`executor::Executor`] walks a data-driven
//! [`action::Action`]'s step list, drives a multi-turn conversation
//! with a model through a [`cascade::CascadeClient`], dispatches tool
//! calls back into the [`action::ActionRegistry`], and terminates with
//! a user-visible answer — all under strict timeout, iteration, and
//! validation discipline.
//!
//! ## Why this crate?
//! | Capability | `action-orchestrator` | Hand-rolled agent loops | Why this helps |
//! |---|---|---|---|
//! | Action space | Data-driven [`action::Action`] recipes, no code changes to add one | Planner hard-codes each capability | Actions load and reload independent of the core |
//! | Model access | One [`cascade::CascadeClient`] cascading across tiers | Single provider, single model | Survives provider outages without caller involvement |
//! | Stop semantics | Explicit `stop_action` + unwrapping rule | Implicit stop on "no tool calls" | No premature or ambiguous termination |
//! | Back-off | Self-damping skip/error counters ([`cascade::health`]) | Often ad-hoc retry loops | Proportional, self-healing degradation |
//! | Validation | Schema-checked params, fed back to the model as a tool error | Crashes or silently coerces | The model gets a chance to correct itself |
//!
//! ## Philosophy
//! The core does not plan and does not reason on its own. It carries
//! no built-in knowledge of any specific action — the action set is
//! pure data, supplied by the caller and validated once at registry
//! build time. Two subsystems carry the engineering weight:
//!
//! - [`executor`] — validates parameters, walks an action's step list,
//!   renders prompt templates via [`template`], drives the multi-turn
//!   tool-calling loop ([`executor::loop_`]), and enforces the
//!   iteration and timeout budgets.
//! - [`cascade`] — speaks an OpenAI-compatible chat-completions
//!   protocol to an ordered set of `(endpoint, model, provider)`
//!   triples, skipping recently-failing entries with exponential
//!   back-off and falling back to a best-health ordering when the
//!   cascade is exhausted.
//!
//! ## Quickstart
//! ```rust,no_run
//! use std::sync::Arc;
//! use action_orchestrator::action::{Action, ActionRegistry, ProcedureStep, Step};
//! use action_orchestrator::cascade::CascadeClient;
//! use action_orchestrator::executor::Executor;
//! use action_orchestrator::schema::Schema;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let ping = Action::new(
//!     "PING",
//!     "Replies with pong.",
//!     Schema::empty(),
//!     vec![Step::Procedure(ProcedureStep {
//!         name: "pong".to_string(),
//!         run: Arc::new(|_params, _prev, _ctx| {
//!             Box::pin(async { Ok(serde_json::json!({"pong": true})) })
//!         }),
//!     })],
//! )?;
//!
//! let registry = ActionRegistry::builder().action(ping).build()?;
//! let cascade = CascadeClient::builder().build()?;
//! let executor = Executor::builder()
//!     .registry(Arc::new(registry))
//!     .cascade(Arc::new(cascade))
//!     .build()?;
//!
//! let result = executor.execute("PING", serde_json::json!({})).await?;
//! println!("{result}");
//! # Ok(())
//! # }
//! ```
//!
//! ## Evidence in this repository
//! - Step linearity and validation precedence: `src/executor/mod.rs` tests
//! - Stop discipline, tool-response pairing, iteration bound: `src/executor/loop_.rs` tests, `tests/multi_turn_loop.rs`
//! - Cascade ordering, back-off damping, fallback pass: `src/cascade/mod.rs` tests, `tests/cascade_failover.rs`
//! - Bucket rollup: `src/cascade/health.rs` tests
//! - Template hermeticity: `src/template/mod.rs` tests

/// Action, Step, ToolChoice, MetaPrompt declarations and the read-only registry.
pub mod action;
/// Model-cascade client: endpoints, wire protocol, health counter, verification.
pub mod cascade;
/// Persisted configuration loading (endpoint credentials, cascade tiers).
pub mod config;
/// Message, Conversation, and ToolCall types shared by the executor and cascade.
pub mod conversation;
/// Type- and name-keyed dependency injection for procedural steps.
pub mod dependency;
/// Error taxonomy surfaced by validation, the registry, the executor, and the cascade.
pub mod error;
/// The executor: step dispatch, the multi-turn loop, and prompt decoration.
pub mod executor;
/// External-collaborator interface consumed by the synthetic external-state message.
pub mod external;
/// JSON-Schema subset and the parameter/argument validator.
pub mod schema;
/// Minimal mustache-compatible template renderer.
pub mod template;

pub use action::{
    action_from_json, register_procedure, Action, ActionRegistry, Intelligence, LlmSchemaStep,
    LlmToolChoiceStep, MetaPrompt, ParamMapFn, ProcedureFn, ProcedureStep, ProcedureTable, Step,
    StepContext, SubActionStep, SystemPromptSpec, ToolChoice,
};
pub use cascade::{
    CascadeClient, CascadeConfig, CascadeEntry, EndpointStore, HealthCounter, IntelligenceLevel,
    ModelEndpoint,
};
pub use conversation::{Conversation, Message, Role, ToolCall};
pub use dependency::DependencyMap;
pub use error::ExecutorError;
pub use executor::{Executor, ExecutorBuilder, ExecutorConfig};
pub use external::{ExternalCollaborator, NoExternalCollaborator};
pub use schema::{PrimitiveType, PropertySchema, Schema};
