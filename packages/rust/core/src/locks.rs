//! Per-page mutual exclusion.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One async mutex per page id; pipelines for the same page run one at a time.
#[derive(Default)]
pub struct PageLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl PageLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `page_id`. Released when the guard drops.
    pub async fn acquire(&self, page_id: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(page_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    /// Drop entries nobody holds or waits on.
    pub fn prune(&self) {
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
