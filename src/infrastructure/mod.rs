//! Infrastructure layer module
//!
//! Ambient concerns shared by every adapter and service:
//! - Configuration management (figment)
//! - Logging infrastructure (tracing)

pub mod config;
pub mod logging;
