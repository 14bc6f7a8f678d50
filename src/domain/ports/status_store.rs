use async_trait::async_trait;
use std::collections::HashSet;
use std::time::Duration;

use crate::domain::errors::DomainResult;
use crate::domain::models::{EntityId, ServiceStatus};

/// Shared storage behind the status manager.
///
/// Every replica of the scheduler talks to the same store, so all operations
/// must be safe under concurrent use from several processes:
/// - the tracked set is a set, adding or removing twice is a no-op
/// - status entries carry their own TTL and disappear on expiry
/// - leases are exclusive for their TTL and renewable by their owner
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Add an entity to the tracked set
    async fn track(&self, entity_id: EntityId) -> DomainResult<()>;

    /// Remove an entity from the tracked set
    async fn untrack(&self, entity_id: EntityId) -> DomainResult<()>;

    /// Snapshot of the tracked set
    async fn get_all_tracked(&self) -> DomainResult<HashSet<EntityId>>;

    /// Cached status, `None` when absent or expired
    async fn get_status(&self, entity_id: EntityId) -> DomainResult<Option<ServiceStatus>>;

    /// Cache a status for `ttl`
    async fn set_status(
        &self,
        entity_id: EntityId,
        status: &ServiceStatus,
        ttl: Duration,
    ) -> DomainResult<()>;

    /// Acquire or renew the lease `name` for `owner`.
    ///
    /// Returns `true` when `owner` holds the lease after the call.
    async fn try_acquire_lease(&self, name: &str, owner: &str, ttl: Duration)
        -> DomainResult<bool>;

    /// Atomically increment and return the counter `name`
    async fn next_version(&self, name: &str) -> DomainResult<u64>;
}
