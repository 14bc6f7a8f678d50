//! Service layer: workflow sequencing, validation, registry and execution,
//! plus the background status manager.

pub mod dependency_resolver;
pub mod status_manager;
pub mod workflow_registry;
pub mod workflow_runner;
pub mod workflow_validator;

#[cfg(test)]
pub(crate) mod test_support;

pub use dependency_resolver::DependencyResolver;
pub use status_manager::{
    StatusManager, StatusManagerConfig, StatusManagerStats, StatusWorkerHandle, SweepReport,
    SWEEP_LEASE,
};
pub use workflow_registry::{RegistryState, WorkflowRegistry};
pub use workflow_runner::{
    ExecutionEvent, RevertOutcome, RevertStatus, RunResult, RunStatus, RunnerConfig, StepFailure,
    WorkflowRunner,
};
pub use workflow_validator::WorkflowValidator;
