//! Redis adapters.

pub mod status_store;

pub use status_store::RedisStatusStore;
