//! Cached wrapper for RunRepository using moka TTL cache.
//!
//! Caches `get_run` lookups. `buffer` writes through, so the cache never
//! serves a run older than the last buffered copy from this process. Runs
//! changed behind the decorator's back must be invalidated explicitly.

use async_trait::async_trait;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{CacheConfig, Run};
use crate::domain::ports::RunRepository;

/// Default TTL for cached runs.
const RUN_CACHE_TTL_SECS: u64 = 60;

/// Maximum number of cached runs.
const RUN_CACHE_MAX_CAPACITY: u64 = 1000;

/// Cached run repository decorator.
///
/// Constructed once at startup and owned by the service wiring.
pub struct CachedRunRepository<R: RunRepository> {
    inner: Arc<R>,
    runs: Cache<Uuid, Arc<Run>>,
}

impl<R: RunRepository> CachedRunRepository<R> {
    /// Create a new cached run repository with default TTL and capacity.
    pub fn new(inner: Arc<R>) -> Self {
        Self::with_ttl(inner, Duration::from_secs(RUN_CACHE_TTL_SECS))
    }

    /// Create with custom TTL.
    pub fn with_ttl(inner: Arc<R>, ttl: Duration) -> Self {
        Self::build(inner, ttl, RUN_CACHE_MAX_CAPACITY)
    }

    /// Create from configuration.
    pub fn from_config(inner: Arc<R>, config: &CacheConfig) -> Self {
        Self::build(inner, Duration::from_secs(config.ttl_secs), config.max_capacity)
    }

    fn build(inner: Arc<R>, ttl: Duration, max_capacity: u64) -> Self {
        let runs = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .build();
        Self { inner, runs }
    }

    /// Drop a cached run.
    pub async fn invalidate(&self, run_id: Uuid) {
        self.runs.invalidate(&run_id).await;
    }

    /// Drop every cached run.
    pub fn invalidate_all(&self) {
        self.runs.invalidate_all();
    }

    /// The wrapped repository.
    pub fn inner(&self) -> &Arc<R> {
        &self.inner
    }
}

#[async_trait]
impl<R: RunRepository + 'static> RunRepository for CachedRunRepository<R> {
    async fn get_run(&self, run_id: Uuid) -> DomainResult<Option<Run>> {
        if let Some(cached) = self.runs.get(&run_id).await {
            return Ok(Some((*cached).clone()));
        }

        let result = self.inner.get_run(run_id).await?;
        if let Some(ref run) = result {
            self.runs.insert(run_id, Arc::new(run.clone())).await;
        }
        Ok(result)
    }

    async fn buffer(&self, run: &Run) -> DomainResult<()> {
        match self.inner.buffer(run).await {
            Ok(()) => {
                self.runs.insert(run.id, Arc::new(run.clone())).await;
                Ok(())
            }
            Err(e) => {
                self.invalidate(run.id).await;
                Err(e)
            }
        }
    }
}
