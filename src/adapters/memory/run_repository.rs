//! In-memory run store.
//!
//! Stands in for the run database plus its write-back buffer: `buffer`
//! replaces the stored copy immediately, so the next `get_run` sees it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::Run;
use crate::domain::ports::RunRepository;

#[derive(Debug, Default)]
pub struct InMemoryRunRepository {
    runs: RwLock<HashMap<Uuid, Run>>,
    buffered: AtomicUsize,
}

impl InMemoryRunRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a run directly, bypassing the buffer counter.
    pub async fn insert_run(&self, run: Run) {
        self.runs.write().await.insert(run.id, run);
    }

    /// Remove a run, as when it is deleted from the store.
    pub async fn remove_run(&self, run_id: Uuid) -> Option<Run> {
        self.runs.write().await.remove(&run_id)
    }

    /// Number of `buffer` calls so far.
    pub fn buffer_count(&self) -> usize {
        self.buffered.load(Ordering::SeqCst)
    }

    pub async fn len(&self) -> usize {
        self.runs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.runs.read().await.is_empty()
    }
}

#[async_trait]
impl RunRepository for InMemoryRunRepository {
    async fn get_run(&self, run_id: Uuid) -> DomainResult<Option<Run>> {
        Ok(self.runs.read().await.get(&run_id).cloned())
    }

    async fn buffer(&self, run: &Run) -> DomainResult<()> {
        let mut runs = self.runs.write().await;
        if !runs.contains_key(&run.id) {
            return Err(DomainError::RunNotFound(run.id));
        }
        runs.insert(run.id, run.clone());
        self.buffered.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
