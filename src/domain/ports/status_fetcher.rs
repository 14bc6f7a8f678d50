use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{EntityId, ServiceStatus};

/// Source of truth for service status, queried on cache misses and by the
/// background refresh.
///
/// Implementations are expected to be slow (a remote call per entity), which
/// is why the status manager caches what they return.
#[async_trait]
pub trait StatusFetcher: Send + Sync {
    /// Fetch the live status of an entity
    ///
    /// # Errors
    /// Returns [`DomainError::StatusFetchFailed`](crate::domain::errors::DomainError::StatusFetchFailed)
    /// when the entity cannot be reached.
    async fn fetch_status(&self, entity_id: EntityId) -> DomainResult<ServiceStatus>;
}
