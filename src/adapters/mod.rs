//! Adapters for external systems.

pub mod cache;
pub mod redis;
pub mod sqlite;
