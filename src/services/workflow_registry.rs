//! Process-wide catalog of workflows and their steps.
//!
//! Lifecycle: `register_workflow` any number of times, then `setup` to
//! sequence and validate everything, then only reads until `shutdown`.
//! Mutation takes `&mut self`; share the registry behind an `Arc` once it is
//! set up.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{StepReference, StepsSequence, WorkflowDefinition};
use crate::domain::ports::Step;
use crate::services::dependency_resolver::DependencyResolver;
use crate::services::workflow_validator::WorkflowValidator;

/// Where the registry is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryState {
    /// Nothing registered.
    Empty,
    /// Workflows registered, `setup` not run yet.
    Registering,
    /// Sequences computed and validated, lookups allowed.
    Ready,
}

#[derive(Default)]
pub struct WorkflowRegistry {
    workflows: BTreeMap<String, WorkflowDefinition>,
    sequences: HashMap<String, StepsSequence>,
    steps: HashMap<StepReference, Arc<dyn Step>>,
    ready: bool,
    resolver: DependencyResolver,
    validator: WorkflowValidator,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> RegistryState {
        if self.ready {
            RegistryState::Ready
        } else if self.workflows.is_empty() {
            RegistryState::Empty
        } else {
            RegistryState::Registering
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Record a workflow under `name`. Nothing is checked until `setup`.
    pub fn register_workflow(
        &mut self,
        name: impl Into<String>,
        definition: WorkflowDefinition,
    ) -> DomainResult<()> {
        if self.ready {
            return Err(DomainError::RegistryAlreadySetUp);
        }
        let name = name.into();
        if self.workflows.contains_key(&name) {
            return Err(DomainError::WorkflowAlreadyRegistered(name));
        }
        tracing::debug!(workflow = %name, steps = definition.steps.len(), "workflow registered");
        self.workflows.insert(name, definition);
        Ok(())
    }

    /// Drop a workflow before `setup`.
    pub fn unregister_workflow(&mut self, name: &str) -> DomainResult<WorkflowDefinition> {
        if self.ready {
            return Err(DomainError::RegistryAlreadySetUp);
        }
        self.workflows
            .remove(name)
            .ok_or_else(|| DomainError::WorkflowNotFound(name.to_string()))
    }

    /// Sequence and validate every registered workflow, then index its steps.
    ///
    /// Fails fast on the first invalid workflow and leaves the registry as it
    /// was. Step references are unique across all workflows. Calling `setup`
    /// again on a ready registry re-validates from scratch.
    pub fn setup(&mut self) -> DomainResult<()> {
        let mut sequences = HashMap::with_capacity(self.workflows.len());
        let mut steps: HashMap<StepReference, Arc<dyn Step>> = HashMap::new();

        for (name, definition) in &self.workflows {
            self.validator.check_initial_context(name, definition)?;
            let sequence = self.resolver.step_sequence(name, definition)?;
            self.validator.check_data_flow(name, definition, &sequence)?;

            for entry in &definition.steps {
                let reference = entry.reference();
                if steps.contains_key(&reference) {
                    return Err(DomainError::StepAlreadyRegistered(reference));
                }
                steps.insert(reference, entry.step.clone());
            }

            tracing::debug!(
                workflow = %name,
                waves = sequence.len(),
                "workflow sequenced"
            );
            sequences.insert(name.clone(), sequence);
        }

        self.sequences = sequences;
        self.steps = steps;
        self.ready = true;
        tracing::info!(
            workflows = self.workflows.len(),
            steps = self.steps.len(),
            "workflow registry ready"
        );
        Ok(())
    }

    /// Forget everything and return to [`RegistryState::Empty`].
    pub fn shutdown(&mut self) {
        self.workflows.clear();
        self.sequences.clear();
        self.steps.clear();
        self.ready = false;
        tracing::info!("workflow registry shut down");
    }

    pub fn get_workflow_steps_sequence(&self, name: &str) -> DomainResult<StepsSequence> {
        self.ensure_ready()?;
        self.sequences
            .get(name)
            .cloned()
            .ok_or_else(|| DomainError::WorkflowNotFound(name.to_string()))
    }

    pub fn get_base_step(&self, reference: &StepReference) -> DomainResult<Arc<dyn Step>> {
        self.ensure_ready()?;
        self.steps
            .get(reference)
            .cloned()
            .ok_or_else(|| DomainError::StepNotFound(reference.clone()))
    }

    pub fn get_workflow(&self, name: &str) -> DomainResult<&WorkflowDefinition> {
        self.ensure_ready()?;
        self.workflows
            .get(name)
            .ok_or_else(|| DomainError::WorkflowNotFound(name.to_string()))
    }

    /// Registered workflow names in sorted order.
    pub fn workflow_names(&self) -> Vec<String> {
        self.workflows.keys().cloned().collect()
    }

    fn ensure_ready(&self) -> DomainResult<()> {
        if self.ready {
            Ok(())
        } else {
            Err(DomainError::RegistryNotReady)
        }
    }
}

impl std::fmt::Debug for WorkflowRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowRegistry")
            .field("state", &self.state())
            .field("workflows", &self.workflow_names())
            .field("steps", &self.steps.len())
            .finish()
    }
}
