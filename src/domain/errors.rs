//! Domain errors for the dynamic scheduler.

use thiserror::Error;

use crate::domain::models::{Direction, EntityId, StepReference};

/// Format a cycle path as a human-readable string: `A -> B -> C -> A`.
fn format_cycle_path(path: &[StepReference]) -> String {
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Domain-level errors that can occur in the dynamic scheduler.
///
/// The first group covers workflow configuration mistakes. They surface from
/// [`WorkflowRegistry::setup`](crate::services::WorkflowRegistry::setup) and
/// are meant to fail process startup. Step execution failures are not errors
/// at this level, they are collected in a
/// [`RunResult`](crate::services::RunResult).
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Workflow '{workflow}' is not a DAG, cycle detected: {}", format_cycle_path(.cycle))]
    NotADag {
        workflow: String,
        cycle: Vec<StepReference>,
    },

    #[error("Step '{step}' of workflow '{workflow}' depends on unknown step '{dependency}'")]
    UnknownDependency {
        workflow: String,
        step: StepReference,
        dependency: StepReference,
    },

    #[error("Step '{step}' is listed more than once in workflow '{workflow}'")]
    DuplicateStepInWorkflow {
        workflow: String,
        step: StepReference,
    },

    #[error("Initial context cannot have optional keys. Workflow '{workflow}' declares optional key '{key}'")]
    OptionalKeyInInitialContext { workflow: String, key: String },

    #[error("Step '{step}' of workflow '{workflow}' requires key '{key}' which is missing from the {direction} sequence_context")]
    MissingRequiredKey {
        workflow: String,
        direction: Direction,
        step: StepReference,
        key: String,
    },

    #[error("Key '{key}' provided by step '{step}' of workflow '{workflow}' was already added by a step in {direction}")]
    DuplicateParallelOutput {
        workflow: String,
        direction: Direction,
        step: StepReference,
        key: String,
    },

    #[error("{0} already registered")]
    StepAlreadyRegistered(StepReference),

    #[error("Workflow already registered: {0}")]
    WorkflowAlreadyRegistered(String),

    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),

    #[error("Step not found: {0}")]
    StepNotFound(StepReference),

    #[error("Workflow registry is not set up")]
    RegistryNotReady,

    #[error("Workflow registry is already set up, shut it down before registering workflows")]
    RegistryAlreadySetUp,

    #[error("Initial context of workflow '{workflow}' is missing key '{key}'")]
    MissingInitialContextKey { workflow: String, key: String },

    #[error("Status fetch failed for {entity_id}: {reason}")]
    StatusFetchFailed { entity_id: EntityId, reason: String },

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}

impl From<redis::RedisError> for DomainError {
    fn from(err: redis::RedisError) -> Self {
        DomainError::StoreError(err.to_string())
    }
}
