//! Workflow domain models.
//!
//! A [`WorkflowDefinition`] is an immutable blueprint: the keys the caller
//! must supply up front plus a list of steps, each with the references of the
//! steps it depends on. The registry turns it into a [`StepsSequence`], an
//! ordered list of waves where steps inside one wave run concurrently.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;

use super::key_config::KeyConfig;
use crate::domain::ports::Step;

/// Stable string key identifying a step across workflows.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepReference(String);

impl StepReference {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    /// Reference derived from the step's fully-qualified type name.
    ///
    /// Matches the default [`Step::unique_reference`].
    pub fn of<S: Step>() -> Self {
        Self(std::any::type_name::<S>().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StepReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StepReference {
    fn from(reference: &str) -> Self {
        Self::new(reference)
    }
}

/// Execution direction of a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Apply,
    Revert,
}

impl Direction {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Apply => "APPLY",
            Self::Revert => "REVERT",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered waves of step references. Wave `i` only depends on waves `< i`.
pub type StepsSequence = Vec<BTreeSet<StepReference>>;

/// A step of a workflow together with the steps it depends on.
#[derive(Clone)]
pub struct StepEntry {
    pub step: Arc<dyn Step>,
    pub requires: Vec<StepReference>,
}

impl StepEntry {
    pub fn reference(&self) -> StepReference {
        self.step.unique_reference()
    }
}

impl fmt::Debug for StepEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepEntry")
            .field("step", &self.reference())
            .field("requires", &self.requires)
            .finish()
    }
}

/// Immutable workflow blueprint.
#[derive(Debug, Clone, Default)]
pub struct WorkflowDefinition {
    /// Keys the caller must provide when starting the workflow.
    pub initial_context: HashSet<KeyConfig>,
    /// Steps in declaration order.
    pub steps: Vec<StepEntry>,
}

impl WorkflowDefinition {
    pub fn new<I, K>(initial_context: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<KeyConfig>,
    {
        Self {
            initial_context: initial_context.into_iter().map(Into::into).collect(),
            steps: Vec::new(),
        }
    }

    /// Add a step that depends on the given references.
    #[must_use]
    pub fn with_step<S, I>(self, step: S, requires: I) -> Self
    where
        S: Step,
        I: IntoIterator<Item = StepReference>,
    {
        self.with_shared_step(Arc::new(step), requires)
    }

    /// Add an already shared step instance.
    #[must_use]
    pub fn with_shared_step<I>(mut self, step: Arc<dyn Step>, requires: I) -> Self
    where
        I: IntoIterator<Item = StepReference>,
    {
        self.steps.push(StepEntry {
            step,
            requires: requires.into_iter().collect(),
        });
        self
    }

    pub fn step_references(&self) -> Vec<StepReference> {
        self.steps.iter().map(StepEntry::reference).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
