//! User desired-state requests for dynamic services.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::status::EntityId;

/// What the user wants for a service: running or gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserDesiredState {
    Present,
    Absent,
}

impl UserDesiredState {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Present => "PRESENT",
            Self::Absent => "ABSENT",
        }
    }
}

impl fmt::Display for UserDesiredState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserDesiredState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PRESENT" => Ok(Self::Present),
            "ABSENT" => Ok(Self::Absent),
            other => Err(format!("unknown user desired state: {other}")),
        }
    }
}

/// Request to start a dynamic service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicServiceStart {
    pub entity_id: EntityId,
    /// Start parameters, stored as given.
    pub payload: serde_json::Value,
}

impl DynamicServiceStart {
    pub fn new(entity_id: EntityId, payload: serde_json::Value) -> Self {
        Self { entity_id, payload }
    }
}

/// Request to stop a dynamic service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicServiceStop {
    pub entity_id: EntityId,
    /// Stop parameters, stored as given.
    pub payload: serde_json::Value,
}

impl DynamicServiceStop {
    pub fn new(entity_id: EntityId, payload: serde_json::Value) -> Self {
        Self { entity_id, payload }
    }
}

/// The last desired state recorded for an entity.
///
/// Only the most recent request is kept: a stop after a start replaces it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRequest {
    pub entity_id: EntityId,
    pub user_desired_state: UserDesiredState,
    /// Payload of the request that set the current state.
    pub payload: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

impl UserRequest {
    pub fn is_present(&self) -> bool {
        self.user_desired_state == UserDesiredState::Present
    }
}

impl From<&DynamicServiceStart> for UserRequest {
    fn from(start: &DynamicServiceStart) -> Self {
        Self {
            entity_id: start.entity_id,
            user_desired_state: UserDesiredState::Present,
            payload: start.payload.clone(),
            updated_at: Utc::now(),
        }
    }
}

impl From<&DynamicServiceStop> for UserRequest {
    fn from(stop: &DynamicServiceStop) -> Self {
        Self {
            entity_id: stop.entity_id,
            user_desired_state: UserDesiredState::Absent,
            payload: stop.payload.clone(),
            updated_at: Utc::now(),
        }
    }
}
