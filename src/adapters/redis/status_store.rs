//! Redis-backed `StatusStore` shared by all scheduler replicas.
//!
//! Key layout under the configured namespace:
//! - `<ns>:status:<entity_id>` JSON status, written with PSETEX
//! - `<ns>:tracked` set of tracked entity ids
//! - `<ns>:lease:<name>` lease owner, written with SET NX PX
//! - `<ns>:version:<name>` INCR counter

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};
use std::collections::HashSet;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{EntityId, ServiceStatus};
use crate::domain::ports::StatusStore;

/// Renew when owned, otherwise take it only if free.
const LEASE_SCRIPT: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('PEXPIRE', KEYS[1], ARGV[2])
elseif redis.call('SET', KEYS[1], ARGV[1], 'NX', 'PX', ARGV[2]) then
    return 1
else
    return 0
end
";

pub struct RedisStatusStore {
    manager: ConnectionManager,
    namespace: String,
    lease_script: Script,
}

impl RedisStatusStore {
    /// Connect to Redis and prefix every key with `namespace`.
    pub async fn connect(url: &str, namespace: &str) -> DomainResult<Self> {
        let client = Client::open(url)?;
        let manager = ConnectionManager::new(client).await?;

        tracing::info!(namespace, "connected to redis status store");
        Ok(Self {
            manager,
            namespace: namespace.to_string(),
            lease_script: Script::new(LEASE_SCRIPT),
        })
    }

    fn status_key(&self, entity_id: EntityId) -> String {
        format!("{}:status:{}", self.namespace, entity_id)
    }

    fn tracked_key(&self) -> String {
        format!("{}:tracked", self.namespace)
    }

    fn lease_key(&self, name: &str) -> String {
        format!("{}:lease:{}", self.namespace, name)
    }

    fn version_key(&self, name: &str) -> String {
        format!("{}:version:{}", self.namespace, name)
    }
}

/// Parse tracked set members, skipping any that are not entity ids.
fn parse_tracked(members: &[String]) -> HashSet<EntityId> {
    members
        .iter()
        .filter_map(|member| match Uuid::parse_str(member) {
            Ok(entity_id) => Some(entity_id),
            Err(err) => {
                tracing::warn!(member = %member, error = %err, "skipping invalid tracked id");
                None
            }
        })
        .collect()
}

fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl StatusStore for RedisStatusStore {
    async fn track(&self, entity_id: EntityId) -> DomainResult<()> {
        let mut conn = self.manager.clone();
        conn.sadd::<_, _, ()>(self.tracked_key(), entity_id.to_string())
            .await?;
        Ok(())
    }

    async fn untrack(&self, entity_id: EntityId) -> DomainResult<()> {
        let mut conn = self.manager.clone();
        conn.srem::<_, _, ()>(self.tracked_key(), entity_id.to_string())
            .await?;
        Ok(())
    }

    async fn get_all_tracked(&self) -> DomainResult<HashSet<EntityId>> {
        let mut conn = self.manager.clone();
        let members: Vec<String> = conn.smembers(self.tracked_key()).await?;

        Ok(parse_tracked(&members))
    }

    async fn get_status(&self, entity_id: EntityId) -> DomainResult<Option<ServiceStatus>> {
        let mut conn = self.manager.clone();
        let raw: Option<String> = conn.get(self.status_key(entity_id)).await?;
        raw.map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(DomainError::from)
    }

    async fn set_status(
        &self,
        entity_id: EntityId,
        status: &ServiceStatus,
        ttl: Duration,
    ) -> DomainResult<()> {
        let mut conn = self.manager.clone();
        let json = serde_json::to_string(status)?;
        conn.pset_ex::<_, _, ()>(self.status_key(entity_id), json, ttl_millis(ttl))
            .await?;
        Ok(())
    }

    async fn try_acquire_lease(
        &self,
        name: &str,
        owner: &str,
        ttl: Duration,
    ) -> DomainResult<bool> {
        let mut conn = self.manager.clone();
        let acquired: i64 = self
            .lease_script
            .key(self.lease_key(name))
            .arg(owner)
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await?;
        Ok(acquired == 1)
    }

    async fn next_version(&self, name: &str) -> DomainResult<u64> {
        let mut conn = self.manager.clone();
        let version: u64 = conn.incr(self.version_key(name), 1u64).await?;
        Ok(version)
    }
}
