//! Service status snapshots tracked by the status manager.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a tracked entity (a dynamic service node).
pub type EntityId = Uuid;

/// Opaque status document of a service.
///
/// The scheduler does not interpret it; it is fetched from the service's
/// controller and cached as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceStatus(pub serde_json::Value);

impl ServiceStatus {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    pub fn into_value(self) -> serde_json::Value {
        self.0
    }
}

impl From<serde_json::Value> for ServiceStatus {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}
