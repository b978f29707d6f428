//! Striped table of per-run locks.
//!
//! Locks are created on first use and dropped from the table as soon as the
//! last holder or waiter lets go, so deleted runs leave nothing behind. Each
//! lock is a `tokio::sync::Mutex`, which queues waiters FIFO: a steady stream
//! of perturbation requests cannot starve a pending report.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::domain::ports::RunLocks;

type Shard = Mutex<HashMap<Uuid, Weak<AsyncMutex<()>>>>;

/// Default number of shards.
const DEFAULT_SHARDS: usize = 16;

/// Lazily populated per-run lock table.
#[derive(Clone)]
pub struct RunLockTable {
    shards: Arc<Vec<Shard>>,
}

impl Default for RunLockTable {
    fn default() -> Self {
        Self::new(DEFAULT_SHARDS)
    }
}

impl RunLockTable {
    /// Create a table with `shards` stripes (rounded up to a power of two).
    pub fn new(shards: usize) -> Self {
        let shards = shards.max(1).next_power_of_two();
        Self {
            shards: Arc::new((0..shards).map(|_| Mutex::new(HashMap::new())).collect()),
        }
    }

    fn shard_index(&self, run_id: &Uuid) -> usize {
        let mut hasher = DefaultHasher::new();
        run_id.hash(&mut hasher);
        (hasher.finish() as usize) & (self.shards.len() - 1)
    }

    fn lock_for(&self, run_id: Uuid, index: usize) -> Arc<AsyncMutex<()>> {
        let mut shard = self.shards[index].lock();
        if let Some(lock) = shard.get(&run_id).and_then(Weak::upgrade) {
            return lock;
        }
        // Waiters that gave up can leave dead entries behind.
        shard.retain(|_, lock| lock.strong_count() > 0);
        let lock = Arc::new(AsyncMutex::new(()));
        shard.insert(run_id, Arc::downgrade(&lock));
        lock
    }

    /// Wait for exclusive access to `run_id`.
    pub async fn lock(&self, run_id: Uuid) -> RunLockGuard {
        let index = self.shard_index(&run_id);
        let lock = self.lock_for(run_id, index);
        let guard = lock.lock_owned().await;
        RunLockGuard {
            guard: Some(guard),
            run_id,
            index,
            shards: Arc::clone(&self.shards),
        }
    }

    /// Number of runs with a live lock (held or awaited).
    pub fn live_locks(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| {
                shard
                    .lock()
                    .values()
                    .filter(|lock| lock.strong_count() > 0)
                    .count()
            })
            .sum()
    }
}

#[async_trait]
impl RunLocks for RunLockTable {
    type Guard = RunLockGuard;

    async fn acquire(&self, run_id: Uuid) -> RunLockGuard {
        self.lock(run_id).await
    }
}

/// Exclusive access to one run, released on drop.
pub struct RunLockGuard {
    guard: Option<OwnedMutexGuard<()>>,
    run_id: Uuid,
    index: usize,
    shards: Arc<Vec<Shard>>,
}

impl RunLockGuard {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }
}

impl Drop for RunLockGuard {
    fn drop(&mut self) {
        // Release first so the strong count reflects only waiters.
        drop(self.guard.take());
        let mut shard = self.shards[self.index].lock();
        if shard
            .get(&self.run_id)
            .is_some_and(|lock| lock.strong_count() == 0)
        {
            shard.remove(&self.run_id);
        }
    }
}
