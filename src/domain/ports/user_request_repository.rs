use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    DynamicServiceStart, DynamicServiceStop, EntityId, UserDesiredState, UserRequest,
};

/// Repository of what users asked for each service.
///
/// One row per entity; every request overwrites the previous one.
#[async_trait]
pub trait UserRequestRepository: Send + Sync {
    /// Record that the service should be running
    async fn request_service_present(&self, start: &DynamicServiceStart) -> DomainResult<()>;

    /// Record that the service should be stopped
    async fn request_service_absent(&self, stop: &DynamicServiceStop) -> DomainResult<()>;

    /// Last request for an entity, `None` if it never had one
    async fn get_user_request(&self, entity_id: EntityId) -> DomainResult<Option<UserRequest>>;

    /// All entities currently in the given desired state
    async fn list_by_desired_state(
        &self,
        state: UserDesiredState,
    ) -> DomainResult<Vec<UserRequest>>;

    /// Forget an entity. Removing an unknown entity is not an error.
    async fn remove(&self, entity_id: EntityId) -> DomainResult<()>;
}
