//! Dynamic Scheduler - workflow orchestration core for dynamic services
//!
//! A workflow is a set of steps with declared dependencies and declared data
//! contracts. The scheduler sequences steps into parallel waves, validates
//! every data contract before anything runs, applies the waves in order and
//! compensates with reverts when a step fails. Alongside it, a background
//! status manager keeps a TTL cache of service statuses shared by all
//! scheduler replicas, and a repository records what users want running.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): workflow models, port traits, errors
//! - **Service Layer** (`services`): sequencer, validator, registry, runner, status manager
//! - **Adapters** (`adapters`): Redis and in-memory status stores, SQLite repository
//! - **Infrastructure Layer** (`infrastructure`): configuration and logging
//!
//! # Example
//!
//! ```ignore
//! use dynamic_scheduler::{WorkflowDefinition, WorkflowRegistry, WorkflowRunner, RunnerConfig};
//! use std::sync::Arc;
//!
//! let mut registry = WorkflowRegistry::new();
//! registry.register_workflow(
//!     "start_service",
//!     WorkflowDefinition::new(["service_id"])
//!         .with_step(PullImage, [])
//!         .with_step(StartContainer, [StepReference::of::<PullImage>()]),
//! )?;
//! registry.setup()?;
//!
//! let runner = WorkflowRunner::new(Arc::new(registry), RunnerConfig::default());
//! let result = runner.run("start_service", context).await?;
//! ```

pub mod adapters;
pub mod domain;
pub mod infrastructure;
pub mod services;

pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::{
    Config, Direction, DynamicServiceStart, DynamicServiceStop, EntityId, KeyConfig,
    ServiceStatus, StepReference, StepsSequence, UserDesiredState, UserRequest, WorkflowContext,
    WorkflowDefinition,
};
pub use domain::ports::{Step, StepError, StatusFetcher, StatusStore, UserRequestRepository};
pub use services::{
    ExecutionEvent, RegistryState, RunResult, RunStatus, RunnerConfig, StatusManager,
    StatusManagerConfig, StatusWorkerHandle, WorkflowRegistry, WorkflowRunner,
};
