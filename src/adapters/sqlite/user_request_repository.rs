//! SQLite implementation of the UserRequestRepository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use super::{parse_datetime, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    DynamicServiceStart, DynamicServiceStop, EntityId, UserDesiredState, UserRequest,
};
use crate::domain::ports::UserRequestRepository;

pub struct SqliteUserRequestRepository {
    pool: SqlitePool,
}

impl SqliteUserRequestRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn upsert(&self, request: &UserRequest) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO user_requests (entity_id, user_desired_state, payload, updated_at)
               VALUES (?, ?, ?, ?)
               ON CONFLICT(entity_id) DO UPDATE SET
                   user_desired_state = excluded.user_desired_state,
                   payload = excluded.payload,
                   updated_at = excluded.updated_at"#,
        )
        .bind(request.entity_id.to_string())
        .bind(request.user_desired_state.as_str())
        .bind(serde_json::to_string(&request.payload)?)
        .bind(request.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        tracing::debug!(
            entity_id = %request.entity_id,
            state = %request.user_desired_state,
            "user request recorded"
        );
        Ok(())
    }
}

#[async_trait]
impl UserRequestRepository for SqliteUserRequestRepository {
    async fn request_service_present(&self, start: &DynamicServiceStart) -> DomainResult<()> {
        self.upsert(&UserRequest::from(start)).await
    }

    async fn request_service_absent(&self, stop: &DynamicServiceStop) -> DomainResult<()> {
        self.upsert(&UserRequest::from(stop)).await
    }

    async fn get_user_request(&self, entity_id: EntityId) -> DomainResult<Option<UserRequest>> {
        let row: Option<UserRequestRow> =
            sqlx::query_as("SELECT * FROM user_requests WHERE entity_id = ?")
                .bind(entity_id.to_string())
                .fetch_optional(&self.pool)
                .await?;

        row.map(|r| r.try_into()).transpose()
    }

    async fn list_by_desired_state(
        &self,
        state: UserDesiredState,
    ) -> DomainResult<Vec<UserRequest>> {
        let rows: Vec<UserRequestRow> = sqlx::query_as(
            "SELECT * FROM user_requests WHERE user_desired_state = ? ORDER BY updated_at",
        )
        .bind(state.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(UserRequest::try_from).collect()
    }

    async fn remove(&self, entity_id: EntityId) -> DomainResult<()> {
        sqlx::query("DELETE FROM user_requests WHERE entity_id = ?")
            .bind(entity_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct UserRequestRow {
    entity_id: String,
    user_desired_state: String,
    payload: String,
    updated_at: String,
}

impl TryFrom<UserRequestRow> for UserRequest {
    type Error = DomainError;

    fn try_from(row: UserRequestRow) -> Result<Self, Self::Error> {
        let user_desired_state = row
            .user_desired_state
            .parse::<UserDesiredState>()
            .map_err(DomainError::SerializationError)?;

        Ok(UserRequest {
            entity_id: parse_uuid(&row.entity_id)?,
            user_desired_state,
            payload: serde_json::from_str(&row.payload)?,
            updated_at: parse_datetime(&row.updated_at)?,
        })
    }
}
