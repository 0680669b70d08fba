//! External-collaborator interface.
//!
//! The executor treats every out-of-core collaborator — a browser-page
//! layer being the motivating example — as a black box that can render
//! its current state into a short text block. The executor never
//! interprets that string; it only splices it into the conversation as
//! a synthetic user message.

use async_trait::async_trait;

/// `get_external_state_bundle() -> string`. Side-effecting primitives
/// invoked as procedural steps (navigate, click, extract, ...) are
/// opaque from the core's point of view and are not part of this
/// trait — their contract is simply "returns a JSON-serializable value
/// within the step timeout, or throws", which
/// [`crate::action::ProcedureFn`] already models directly.
#[async_trait]
pub trait ExternalCollaborator: Send + Sync {
    async fn get_external_state_bundle(&self) -> String;
}

/// Used when no collaborator is configured: renders an empty state
/// bundle, so the synthetic external-state message is still inserted
/// (as an empty user turn) without special-casing its absence at every
/// call site.
pub struct NoExternalCollaborator;

#[async_trait]
impl ExternalCollaborator for NoExternalCollaborator {
    async fn get_external_state_bundle(&self) -> String {
        String::new()
    }
}
