use async_trait::async_trait;
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;

use crate::domain::models::{KeyConfig, StepReference, WorkflowContext};

/// Failure raised by a step's `apply` or `revert`.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct StepError {
    pub message: String,
}

impl StepError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for StepError {
    fn from(err: anyhow::Error) -> Self {
        Self::new(format!("{err:#}"))
    }
}

impl From<String> for StepError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for StepError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// A unit of work with a compensating revert.
///
/// Steps declare the context keys they read and write in each direction.
/// The registry checks those declarations at setup time so that missing inputs
/// surface before anything runs. At run time the runner hands `apply` only the
/// declared inputs and keeps only the declared outputs.
///
/// Steps must be stateless: the same instance may run concurrently for
/// different workflow executions.
#[async_trait]
pub trait Step: Send + Sync + 'static {
    /// Stable identifier of the step, the fully-qualified type name by default.
    fn unique_reference(&self) -> StepReference {
        StepReference::new(std::any::type_name::<Self>())
    }

    /// Keys read by `apply`.
    fn apply_requests_inputs(&self) -> HashSet<KeyConfig> {
        HashSet::new()
    }

    /// Keys written by `apply`.
    fn apply_provides_outputs(&self) -> HashSet<KeyConfig> {
        HashSet::new()
    }

    /// Keys read by `revert`.
    fn revert_requests_inputs(&self) -> HashSet<KeyConfig> {
        HashSet::new()
    }

    /// Keys written by `revert`.
    fn revert_provides_outputs(&self) -> HashSet<KeyConfig> {
        HashSet::new()
    }

    /// Per-attempt timeout for `apply`, `None` uses the runner default.
    fn apply_timeout(&self) -> Option<Duration> {
        None
    }

    /// Per-attempt timeout for `revert`, `None` uses the runner default.
    fn revert_timeout(&self) -> Option<Duration> {
        None
    }

    /// Retries after a failed `apply` attempt, `None` uses the runner default.
    fn apply_retries(&self) -> Option<u32> {
        None
    }

    /// Retries after a failed `revert` attempt, `None` uses the runner default.
    fn revert_retries(&self) -> Option<u32> {
        None
    }

    /// Pause between attempts, `None` uses the runner default.
    fn wait_between_attempts(&self) -> Option<Duration> {
        None
    }

    /// Perform the step. `inputs` holds exactly the declared inputs present
    /// in the context.
    async fn apply(&self, inputs: WorkflowContext) -> Result<WorkflowContext, StepError>;

    /// Undo the effects of `apply`. Does nothing by default.
    async fn revert(&self, inputs: WorkflowContext) -> Result<WorkflowContext, StepError> {
        let _ = inputs;
        Ok(WorkflowContext::new())
    }
}
