//! In-memory status storage.
//!
//! Uses `moka` for concurrent caching with a TTL per entry. Suitable for
//! single-process deployments and tests; multi-replica deployments use the
//! Redis store.

pub mod memory_status_store;

pub use memory_status_store::MemoryStatusStore;
