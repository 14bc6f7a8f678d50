pub mod config;
pub mod key_config;
pub mod status;
pub mod user_request;
pub mod workflow;

pub use config::{
    Config, DatabaseConfig, LoggingConfig, RedisConfig, RunnerSettings, StatusMonitorConfig,
};
pub use key_config::{KeyConfig, WorkflowContext};
pub use status::{EntityId, ServiceStatus};
pub use user_request::{DynamicServiceStart, DynamicServiceStop, UserDesiredState, UserRequest};
pub use workflow::{Direction, StepEntry, StepReference, StepsSequence, WorkflowDefinition};
