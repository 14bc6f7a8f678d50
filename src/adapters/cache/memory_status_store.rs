//! In-process `StatusStore` using a moka cache with per-entry TTL.
//!
//! Shares the semantics of the Redis store within one process: several
//! status managers holding the same `Arc<MemoryStatusStore>` behave like
//! replicas sharing a Redis instance.

use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};

use crate::domain::errors::DomainResult;
use crate::domain::models::{EntityId, ServiceStatus};
use crate::domain::ports::StatusStore;

/// Maximum number of cached statuses.
const STATUS_CACHE_MAX_CAPACITY: u64 = 100_000;

#[derive(Debug, Clone)]
struct CachedStatus {
    status: ServiceStatus,
    ttl: Duration,
}

/// Expire each entry after the TTL it was written with.
struct PerEntryTtl;

impl Expiry<EntityId, CachedStatus> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &EntityId,
        value: &CachedStatus,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &EntityId,
        value: &CachedStatus,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

pub struct MemoryStatusStore {
    statuses: Cache<EntityId, CachedStatus>,
    tracked: RwLock<HashSet<EntityId>>,
    /// Lease name -> (owner, expiry).
    leases: Mutex<HashMap<String, (String, Instant)>>,
    versions: Mutex<HashMap<String, u64>>,
}

impl MemoryStatusStore {
    pub fn new() -> Self {
        let statuses = Cache::builder()
            .max_capacity(STATUS_CACHE_MAX_CAPACITY)
            .expire_after(PerEntryTtl)
            .build();

        Self {
            statuses,
            tracked: RwLock::new(HashSet::new()),
            leases: Mutex::new(HashMap::new()),
            versions: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStatusStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StatusStore for MemoryStatusStore {
    async fn track(&self, entity_id: EntityId) -> DomainResult<()> {
        self.tracked.write().await.insert(entity_id);
        Ok(())
    }

    async fn untrack(&self, entity_id: EntityId) -> DomainResult<()> {
        self.tracked.write().await.remove(&entity_id);
        Ok(())
    }

    async fn get_all_tracked(&self) -> DomainResult<HashSet<EntityId>> {
        Ok(self.tracked.read().await.clone())
    }

    async fn get_status(&self, entity_id: EntityId) -> DomainResult<Option<ServiceStatus>> {
        Ok(self
            .statuses
            .get(&entity_id)
            .await
            .map(|cached| cached.status))
    }

    async fn set_status(
        &self,
        entity_id: EntityId,
        status: &ServiceStatus,
        ttl: Duration,
    ) -> DomainResult<()> {
        self.statuses
            .insert(
                entity_id,
                CachedStatus {
                    status: status.clone(),
                    ttl,
                },
            )
            .await;
        Ok(())
    }

    async fn try_acquire_lease(
        &self,
        name: &str,
        owner: &str,
        ttl: Duration,
    ) -> DomainResult<bool> {
        let now = Instant::now();
        let mut leases = self.leases.lock().await;
        match leases.get(name) {
            Some((holder, expires_at)) if holder != owner && *expires_at > now => Ok(false),
            _ => {
                leases.insert(name.to_string(), (owner.to_string(), now + ttl));
                Ok(true)
            }
        }
    }

    async fn next_version(&self, name: &str) -> DomainResult<u64> {
        let mut versions = self.versions.lock().await;
        let version = versions.entry(name.to_string()).or_insert(0);
        *version += 1;
        Ok(*version)
    }
}
