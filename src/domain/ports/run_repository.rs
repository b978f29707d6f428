use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::Run;

/// Repository port for tuning runs.
///
/// Stands in for the run store and its write-back buffer.
#[async_trait]
pub trait RunRepository: Send + Sync {
    /// Get a run by ID
    async fn get_run(&self, run_id: Uuid) -> DomainResult<Option<Run>>;

    /// Hand a mutated run to the write-back buffer.
    ///
    /// Must not block on I/O: implementations queue the flush and return.
    /// Once this returns, the next `get_run` observes the buffered state.
    async fn buffer(&self, run: &Run) -> DomainResult<()>;
}
