//! Port trait definitions (Hexagonal Architecture)
//!
//! This module defines the interfaces between the scheduler core and the
//! outside world:
//! - Step: a unit of work with apply and revert
//! - StatusStore: shared status cache, tracked set and sweep lease
//! - StatusFetcher: live status source used on cache misses
//! - UserRequestRepository: persisted user desired state

pub mod status_fetcher;
pub mod status_store;
pub mod step;
pub mod user_request_repository;

pub use status_fetcher::StatusFetcher;
pub use status_store::StatusStore;
pub use step::{Step, StepError};
pub use user_request_repository::UserRequestRepository;
