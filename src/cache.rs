// src/cache.rs
//! # Snapshot cache
//! Holds the last published `Snapshot` and decides when a new cycle runs.
//!
//! - Fresh (younger than the TTL): returned as is, same `Arc`.
//! - Missing or stale: single-flight refresh. Callers queue on one async mutex;
//!   whoever gets it second re-checks freshness and reuses the new snapshot.
//! - Publication swaps the `Arc` under a write lock, so readers see either the
//!   old snapshot or the new one, never a mix.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use metrics::{counter, gauge};
use tokio::time::Instant;

use crate::model::{Snapshot, Status};

/// Something that can produce a complete snapshot.
#[async_trait]
pub trait CycleRunner: Send + Sync {
    async fn run_cycle(&self) -> Snapshot;
}

#[derive(Clone)]
struct Cached {
    snapshot: Arc<Snapshot>,
    stored_at: Instant,
}

pub struct SnapshotCache {
    runner: Arc<dyn CycleRunner>,
    ttl: Duration,
    current: RwLock<Option<Cached>>,
    refresh: tokio::sync::Mutex<()>,
}

impl SnapshotCache {
    pub fn new(runner: Arc<dyn CycleRunner>, ttl: Duration) -> Self {
        Self {
            runner,
            ttl,
            current: RwLock::new(None),
            refresh: tokio::sync::Mutex::new(()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Current snapshot, refreshed first when older than the configured TTL.
    pub async fn get_or_refresh(&self) -> Arc<Snapshot> {
        self.get_or_refresh_within(self.ttl).await
    }

    /// Same as `get_or_refresh` with an explicit TTL.
    pub async fn get_or_refresh_within(&self, ttl: Duration) -> Arc<Snapshot> {
        if let Some(s) = self.fresh(ttl) {
            counter!("status_cache_hits_total").increment(1);
            return s;
        }

        let _flight = self.refresh.lock().await;
        if let Some(s) = self.fresh(ttl) {
            tracing::debug!(target: "cache", "joined an in-flight refresh");
            counter!("status_cache_hits_total").increment(1);
            return s;
        }

        counter!("status_cache_misses_total").increment(1);
        self.run_and_publish().await
    }

    /// Run a cycle now, whatever the age of the stored snapshot. Still single-flight.
    pub async fn refresh(&self) -> Arc<Snapshot> {
        let _flight = self.refresh.lock().await;
        self.run_and_publish().await
    }

    async fn run_and_publish(&self) -> Arc<Snapshot> {
        let snapshot = Arc::new(self.runner.run_cycle().await);
        self.publish(snapshot.clone());
        snapshot
    }

    /// Last snapshot regardless of age; never runs a cycle.
    pub fn peek(&self) -> Option<Arc<Snapshot>> {
        self.read().as_ref().map(|c| c.snapshot.clone())
    }

    /// Age of the stored snapshot.
    pub fn age(&self) -> Option<Duration> {
        self.read().as_ref().map(|c| c.stored_at.elapsed())
    }

    /// Drop the stored snapshot so the next read runs a cycle.
    pub fn invalidate(&self) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn fresh(&self, ttl: Duration) -> Option<Arc<Snapshot>> {
        self.read()
            .as_ref()
            .filter(|c| c.stored_at.elapsed() < ttl)
            .map(|c| c.snapshot.clone())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Option<Cached>> {
        self.current.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, snapshot: Arc<Snapshot>) {
        gauge!("status_last_cycle_ts").set(snapshot.captured_at.timestamp() as f64);
        gauge!("status_services_disrupted").set(snapshot.count_with(Status::Disrupted) as f64);
        gauge!("status_services_unknown").set(snapshot.count_with(Status::Unknown) as f64);

        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Some(Cached {
            snapshot,
            stored_at: Instant::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeMap;

    struct Empty;

    #[async_trait]
    impl CycleRunner for Empty {
        async fn run_cycle(&self) -> Snapshot {
            Snapshot {
                services: BTreeMap::new(),
                captured_at: Utc::now(),
            }
        }
    }

    #[tokio::test]
    async fn peek_and_invalidate() {
        let cache = SnapshotCache::new(Arc::new(Empty), Duration::from_secs(60));
        assert!(cache.peek().is_none());
        assert!(cache.age().is_none());

        let first = cache.get_or_refresh().await;
        assert!(Arc::ptr_eq(&first, &cache.peek().unwrap()));

        cache.invalidate();
        assert!(cache.peek().is_none());
    }

    #[tokio::test]
    async fn zero_ttl_always_refreshes() {
        let cache = SnapshotCache::new(Arc::new(Empty), Duration::ZERO);
        let a = cache.get_or_refresh().await;
        let b = cache.get_or_refresh().await;
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
