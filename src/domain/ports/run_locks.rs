use async_trait::async_trait;
use uuid::Uuid;

/// Per-run mutual exclusion.
///
/// Calls for different runs proceed in parallel; calls for the same run are
/// serialized for as long as the guard lives. Implementations must be fair
/// enough that a steady stream of requests cannot starve report submission.
#[async_trait]
pub trait RunLocks: Send + Sync {
    /// Guard releasing the lock on drop.
    type Guard: Send;

    /// Wait for exclusive access to `run_id`.
    async fn acquire(&self, run_id: Uuid) -> Self::Guard;
}
