//! Domain layer for the dynamic scheduler
//!
//! This module contains the workflow model, the port traits and the error
//! taxonomy shared by services and adapters.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult};
