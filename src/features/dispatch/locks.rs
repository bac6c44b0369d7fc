//! Per-contact write serialization
//!
//! Dispatch and follow-up promotion both mutate contact status and timestamps.
//! Each contact gets its own async mutex, created on first use and dropped
//! from the map once no guard or waiter refers to it; different contacts
//! never contend.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockMap = DashMap<i64, Arc<Mutex<()>>>;

#[derive(Clone, Default)]
pub struct ContactLocks {
    locks: Arc<LockMap>,
}

/// Exclusive access to one contact. Releases on drop.
pub struct ContactGuard {
    contact_id: i64,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<LockMap>,
}

impl ContactLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `contact_id`
    pub async fn acquire(&self, contact_id: i64) -> ContactGuard {
        // Clone out of the map so the shard lock is not held across the await
        let lock = self.locks.entry(contact_id).or_default().clone();
        let guard = lock.lock_owned().await;
        ContactGuard {
            contact_id,
            guard: Some(guard),
            locks: self.locks.clone(),
        }
    }

    /// Number of contacts currently locked or waited on
    pub fn tracked(&self) -> usize {
        self.locks.len()
    }
}

impl Drop for ContactGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Only the map's own reference left: nobody holds or waits for it
        self.locks
            .remove_if(&self.contact_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}
