//! Process-wide read-only action registry.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{ExecutorError, NotFoundError};

use super::Action;

/// Built once at startup by union-ing the declared action set. Lookup
/// is by exact name; absence is a [`NotFoundError`] surfaced at
/// invocation time.
#[derive(Default)]
pub struct ActionRegistry {
    actions: HashMap<String, Arc<Action>>,
}

#[derive(Default)]
pub struct ActionRegistryBuilder {
    actions: HashMap<String, Arc<Action>>,
}

impl ActionRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn action(mut self, action: Action) -> Self {
        self.actions.insert(action.name.clone(), Arc::new(action));
        self
    }

    /// Builds the registry and checks that every action name referenced
    /// by a sub-action or tool-choice step resolves within the same
    /// registry before returning it — a registry that fails this check
    /// is never handed to an [`crate::executor::Executor`].
    pub fn build(self) -> Result<ActionRegistry, ExecutorError> {
        let registry = ActionRegistry {
            actions: self.actions,
        };
        registry.validate_references()?;
        Ok(registry)
    }
}

impl ActionRegistry {
    pub fn builder() -> ActionRegistryBuilder {
        ActionRegistryBuilder::new()
    }

    pub fn get(&self, name: &str) -> Result<Arc<Action>, NotFoundError> {
        self.actions
            .get(name)
            .cloned()
            .ok_or_else(|| NotFoundError(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    fn validate_references(&self) -> Result<(), ExecutorError> {
        for action in self.actions.values() {
            for step in &action.steps {
                for referenced in step.referenced_actions() {
                    if !self.contains(referenced) {
                        return Err(ExecutorError::InvalidAction(format!(
                            "action `{}` references unknown action `{referenced}`",
                            action.name
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}
