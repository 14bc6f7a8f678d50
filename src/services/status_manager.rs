//! Distributed service status cache with a background refresh worker.
//!
//! Statuses live in a shared [`StatusStore`] with a TTL. Every replica runs a
//! worker, but each sweep is guarded by a lease so only one replica refreshes
//! at a time. When the lease holder dies its lease expires and another
//! replica takes over on its next tick.

use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{EntityId, ServiceStatus, StatusMonitorConfig};
use crate::domain::ports::{StatusFetcher, StatusStore};

/// Name of the lease guarding background sweeps.
pub const SWEEP_LEASE: &str = "status_sweep";

/// Configuration for the status manager.
#[derive(Debug, Clone)]
pub struct StatusManagerConfig {
    /// Interval between sweeps.
    pub refresh_interval: Duration,
    /// Lifetime of a cached status.
    pub status_ttl: Duration,
    /// Maximum concurrent fetches during a sweep.
    pub max_parallel_updates: usize,
    /// Lifetime of the sweep lease, longer than `refresh_interval`.
    pub lease_ttl: Duration,
    /// Identity of this replica as a lease owner.
    pub instance_id: String,
}

impl StatusManagerConfig {
    /// Create a config. `max_parallel_updates` has no default; values below
    /// one are raised to one.
    pub fn new(max_parallel_updates: usize) -> Self {
        Self {
            refresh_interval: Duration::from_secs(5),
            status_ttl: Duration::from_secs(60),
            max_parallel_updates: max_parallel_updates.max(1),
            lease_ttl: Duration::from_secs(15),
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    /// Build from the loaded settings, `None` when `max_parallel_updates` is
    /// not configured.
    pub fn from_settings(settings: &StatusMonitorConfig) -> Option<Self> {
        let max_parallel_updates = settings.max_parallel_updates?;
        Some(Self {
            refresh_interval: settings.refresh_interval(),
            status_ttl: settings.status_ttl(),
            lease_ttl: settings.lease_ttl(),
            ..Self::new(max_parallel_updates)
        })
    }

    #[must_use]
    pub fn with_refresh_interval(mut self, refresh_interval: Duration) -> Self {
        self.refresh_interval = refresh_interval;
        self
    }

    #[must_use]
    pub fn with_status_ttl(mut self, status_ttl: Duration) -> Self {
        self.status_ttl = status_ttl;
        self
    }

    #[must_use]
    pub fn with_lease_ttl(mut self, lease_ttl: Duration) -> Self {
        self.lease_ttl = lease_ttl;
        self
    }

    #[must_use]
    pub fn with_instance_id(mut self, instance_id: impl Into<String>) -> Self {
        self.instance_id = instance_id.into();
        self
    }
}

#[derive(Debug, Default)]
struct StatusCounters {
    sweeps: AtomicU64,
    skipped_sweeps: AtomicU64,
    refreshed: AtomicU64,
    failed: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
}

/// Counters of a status manager since creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusManagerStats {
    /// Sweeps run while holding the lease.
    pub sweeps: u64,
    /// Ticks where another replica held the lease.
    pub skipped_sweeps: u64,
    /// Statuses refreshed by sweeps.
    pub refreshed: u64,
    /// Status refreshes that failed.
    pub failed: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub tracked: usize,
    pub refreshed: usize,
    pub failed: usize,
}

pub struct StatusManager {
    store: Arc<dyn StatusStore>,
    fetcher: Arc<dyn StatusFetcher>,
    config: StatusManagerConfig,
    counters: Arc<StatusCounters>,
}

impl StatusManager {
    pub fn new(
        store: Arc<dyn StatusStore>,
        fetcher: Arc<dyn StatusFetcher>,
        config: StatusManagerConfig,
    ) -> Self {
        Self {
            store,
            fetcher,
            config,
            counters: Arc::new(StatusCounters::default()),
        }
    }

    pub fn config(&self) -> &StatusManagerConfig {
        &self.config
    }

    /// Start refreshing an entity's status. Idempotent.
    pub async fn track(&self, entity_id: EntityId) -> DomainResult<()> {
        self.store.track(entity_id).await
    }

    /// Stop refreshing an entity's status. Idempotent.
    pub async fn untrack(&self, entity_id: EntityId) -> DomainResult<()> {
        self.store.untrack(entity_id).await
    }

    pub async fn get_all_tracked(&self) -> DomainResult<HashSet<EntityId>> {
        self.store.get_all_tracked().await
    }

    /// Cached status, `None` when absent or expired.
    pub async fn get_status(&self, entity_id: EntityId) -> DomainResult<Option<ServiceStatus>> {
        self.store.get_status(entity_id).await
    }

    pub async fn set_status(
        &self,
        entity_id: EntityId,
        status: &ServiceStatus,
        ttl: Duration,
    ) -> DomainResult<()> {
        self.store.set_status(entity_id, status, ttl).await
    }

    /// Cached status, falling back to a live fetch on a miss.
    ///
    /// A miss is expected right after tracking starts or after a replica
    /// failover, so it is logged and counted but not treated as an error.
    /// A failing store read is handled the same way.
    pub async fn get_scheduler_service_status(
        &self,
        entity_id: EntityId,
    ) -> DomainResult<ServiceStatus> {
        match self.store.get_status(entity_id).await {
            Ok(Some(status)) => {
                self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
                return Ok(status);
            }
            Ok(None) => {
                tracing::warn!(entity_id = %entity_id, "{entity_id} not found in redis cache");
            }
            Err(err) => {
                tracing::warn!(
                    entity_id = %entity_id,
                    error = %err,
                    "status cache read failed, fetching directly"
                );
            }
        }

        self.counters.cache_misses.fetch_add(1, Ordering::Relaxed);
        self.fetcher.fetch_status(entity_id).await
    }

    /// Fetch and cache the status of every tracked entity, at most
    /// `max_parallel_updates` at a time. One failing entity does not affect
    /// the others.
    pub async fn update_tracked_statuses(&self) -> DomainResult<SweepReport> {
        let tracked = self.store.get_all_tracked().await?;
        let mut report = SweepReport {
            tracked: tracked.len(),
            ..Default::default()
        };

        let results: Vec<(EntityId, DomainResult<()>)> = stream::iter(tracked)
            .map(|entity_id| async move { (entity_id, self.refresh_one(entity_id).await) })
            .buffer_unordered(self.config.max_parallel_updates)
            .collect()
            .await;

        for (entity_id, outcome) in results {
            match outcome {
                Ok(()) => report.refreshed += 1,
                Err(err) => {
                    tracing::warn!(entity_id = %entity_id, error = %err, "status refresh failed");
                    report.failed += 1;
                }
            }
        }

        self.counters
            .refreshed
            .fetch_add(report.refreshed as u64, Ordering::Relaxed);
        self.counters
            .failed
            .fetch_add(report.failed as u64, Ordering::Relaxed);
        Ok(report)
    }

    async fn refresh_one(&self, entity_id: EntityId) -> DomainResult<()> {
        let status = self.fetcher.fetch_status(entity_id).await?;
        self.store
            .set_status(entity_id, &status, self.config.status_ttl)
            .await
    }

    pub fn stats(&self) -> StatusManagerStats {
        StatusManagerStats {
            sweeps: self.counters.sweeps.load(Ordering::Relaxed),
            skipped_sweeps: self.counters.skipped_sweeps.load(Ordering::Relaxed),
            refreshed: self.counters.refreshed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            cache_hits: self.counters.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.counters.cache_misses.load(Ordering::Relaxed),
        }
    }

    /// Spawn the background refresh worker.
    pub fn start(self: Arc<Self>) -> StatusWorkerHandle {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(self.clone().run_loop(cancel.clone()));
        StatusWorkerHandle {
            cancel,
            task,
            manager: self,
        }
    }

    /// Main worker loop.
    async fn run_loop(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = interval(self.config.refresh_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut leading = false;

        tracing::info!(instance = %self.config.instance_id, "status worker started");

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    leading = self.run_sweep_cycle(leading).await;
                }
            }
        }

        tracing::info!(instance = %self.config.instance_id, "status worker stopped");
    }

    /// One tick: take or renew the lease, then sweep if held. Returns whether
    /// this replica holds the lease.
    async fn run_sweep_cycle(&self, was_leading: bool) -> bool {
        let instance = &self.config.instance_id;
        match self
            .store
            .try_acquire_lease(SWEEP_LEASE, instance, self.config.lease_ttl)
            .await
        {
            Ok(true) => {
                if !was_leading {
                    tracing::info!(instance = %instance, "took over status sweep lease");
                }
                match self.update_tracked_statuses().await {
                    Ok(report) => tracing::debug!(
                        instance = %instance,
                        tracked = report.tracked,
                        refreshed = report.refreshed,
                        failed = report.failed,
                        "status sweep completed"
                    ),
                    Err(err) => {
                        tracing::warn!(instance = %instance, error = %err, "status sweep failed");
                    }
                }
                self.counters.sweeps.fetch_add(1, Ordering::Relaxed);
                true
            }
            Ok(false) => {
                if was_leading {
                    tracing::warn!(instance = %instance, "lost status sweep lease");
                } else {
                    tracing::debug!(instance = %instance, "status sweep owned by another replica");
                }
                self.counters.skipped_sweeps.fetch_add(1, Ordering::Relaxed);
                false
            }
            Err(err) => {
                tracing::warn!(instance = %instance, error = %err, "could not acquire status sweep lease");
                self.counters.skipped_sweeps.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }
}

/// Handle to the background refresh worker.
pub struct StatusWorkerHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
    manager: Arc<StatusManager>,
}

impl StatusWorkerHandle {
    /// Stop the worker and wait for it to exit.
    pub async fn stop(self) {
        self.cancel.cancel();
        let _ = self.task.await;
    }

    /// Kill the worker without cleanup. The lease is left to expire.
    pub fn abort(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn stats(&self) -> StatusManagerStats {
        self.manager.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::cache::MemoryStatusStore;
    use crate::domain::errors::DomainError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CountingFetcher {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        calls: AtomicUsize,
        failing: Option<EntityId>,
    }

    #[async_trait]
    impl StatusFetcher for CountingFetcher {
        async fn fetch_status(&self, entity_id: EntityId) -> DomainResult<ServiceStatus> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.failing == Some(entity_id) {
                return Err(DomainError::StatusFetchFailed {
                    entity_id,
                    reason: "unreachable".to_string(),
                });
            }
            Ok(ServiceStatus::new(json!({"state": "running", "id": entity_id})))
        }
    }

    fn manager_with(fetcher: Arc<CountingFetcher>, max_parallel: usize) -> StatusManager {
        StatusManager::new(
            Arc::new(MemoryStatusStore::new()),
            fetcher,
            StatusManagerConfig::new(max_parallel),
        )
    }

    #[test]
    fn test_config_requires_parallelism() {
        assert_eq!(StatusManagerConfig::new(0).max_parallel_updates, 1);
        assert!(StatusManagerConfig::from_settings(&StatusMonitorConfig::default()).is_none());

        let settings = StatusMonitorConfig {
            max_parallel_updates: Some(8),
            refresh_interval_ms: 100,
            ..Default::default()
        };
        let config = StatusManagerConfig::from_settings(&settings).unwrap();
        assert_eq!(config.max_parallel_updates, 8);
        assert_eq!(config.refresh_interval, Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_cache_hit_and_miss() {
        let fetcher = Arc::new(CountingFetcher::default());
        let manager = manager_with(fetcher.clone(), 2);
        let id = Uuid::new_v4();

        let status = manager.get_scheduler_service_status(id).await.unwrap();
        assert_eq!(status.as_value()["state"], "running");
        assert_eq!(manager.stats().cache_misses, 1);

        manager
            .set_status(id, &status, Duration::from_secs(10))
            .await
            .unwrap();
        manager.get_scheduler_service_status(id).await.unwrap();
        assert_eq!(manager.stats().cache_hits, 1);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    /// Store whose status reads always fail.
    struct UnreachableStore(MemoryStatusStore);

    #[async_trait]
    impl StatusStore for UnreachableStore {
        async fn track(&self, entity_id: EntityId) -> DomainResult<()> {
            self.0.track(entity_id).await
        }

        async fn untrack(&self, entity_id: EntityId) -> DomainResult<()> {
            self.0.untrack(entity_id).await
        }

        async fn get_all_tracked(&self) -> DomainResult<HashSet<EntityId>> {
            self.0.get_all_tracked().await
        }

        async fn get_status(&self, _entity_id: EntityId) -> DomainResult<Option<ServiceStatus>> {
            Err(DomainError::StoreError("connection refused".to_string()))
        }

        async fn set_status(
            &self,
            entity_id: EntityId,
            status: &ServiceStatus,
            ttl: Duration,
        ) -> DomainResult<()> {
            self.0.set_status(entity_id, status, ttl).await
        }

        async fn try_acquire_lease(
            &self,
            name: &str,
            owner: &str,
            ttl: Duration,
        ) -> DomainResult<bool> {
            self.0.try_acquire_lease(name, owner, ttl).await
        }

        async fn next_version(&self, name: &str) -> DomainResult<u64> {
            self.0.next_version(name).await
        }
    }

    #[tokio::test]
    async fn test_store_read_failure_falls_back_to_fetch() {
        let fetcher = Arc::new(CountingFetcher::default());
        let manager = StatusManager::new(
            Arc::new(UnreachableStore(MemoryStatusStore::new())),
            fetcher.clone(),
            StatusManagerConfig::new(2),
        );
        let id = Uuid::new_v4();

        let status = manager.get_scheduler_service_status(id).await.unwrap();
        assert_eq!(status.as_value()["state"], "running");
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(manager.stats().cache_misses, 1);
        assert_eq!(manager.stats().cache_hits, 0);
    }

    #[tokio::test]
    async fn test_sweep_respects_parallelism() {
        let fetcher = Arc::new(CountingFetcher::default());
        let manager = manager_with(fetcher.clone(), 3);
        for _ in 0..12 {
            manager.track(Uuid::new_v4()).await.unwrap();
        }

        let report = manager.update_tracked_statuses().await.unwrap();
        assert_eq!(report.tracked, 12);
        assert_eq!(report.refreshed, 12);
        assert!(fetcher.max_in_flight.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_sweep_isolates_failures() {
        let bad = Uuid::new_v4();
        let good = Uuid::new_v4();
        let fetcher = Arc::new(CountingFetcher {
            failing: Some(bad),
            ..Default::default()
        });
        let manager = manager_with(fetcher, 4);
        manager.track(bad).await.unwrap();
        manager.track(good).await.unwrap();

        let report = manager.update_tracked_statuses().await.unwrap();
        assert_eq!(report.refreshed, 1);
        assert_eq!(report.failed, 1);
        assert!(manager.get_status(good).await.unwrap().is_some());
        assert!(manager.get_status(bad).await.unwrap().is_none());
        assert_eq!(manager.stats().failed, 1);
    }

    #[tokio::test]
    async fn test_worker_sweeps_and_stops() {
        let fetcher = Arc::new(CountingFetcher::default());
        let store = Arc::new(MemoryStatusStore::new());
        let manager = Arc::new(StatusManager::new(
            store,
            fetcher,
            StatusManagerConfig::new(2)
                .with_refresh_interval(Duration::from_millis(10))
                .with_lease_ttl(Duration::from_millis(100)),
        ));
        let id = Uuid::new_v4();
        manager.track(id).await.unwrap();

        let handle = manager.clone().start();
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(handle.stats().sweeps >= 1);
        handle.stop().await;

        assert!(manager.get_status(id).await.unwrap().is_some());
    }
}
