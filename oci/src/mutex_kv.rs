//! Named async locks
//!
//! OCI rejects concurrent changes to one load balancer backend set, and a
//! backend set update rewrites its backend list. Operations on the same
//! `<load balancer id>/<backend set name>` key take the same lock.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

/// Locks are created on demand. The map only holds weak references, so a
/// key nobody holds or waits for is dropped on the next call.
#[derive(Default)]
pub struct KeyedMutex {
    locks: Mutex<HashMap<String, Weak<Mutex<()>>>>,
}

impl KeyedMutex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the lock on `key`; it is released when the guard drops.
    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.retain(|_, lock| lock.strong_count() > 0);
            match locks.get(key).and_then(Weak::upgrade) {
                Some(lock) => lock,
                None => {
                    let lock = Arc::new(Mutex::new(()));
                    locks.insert(key.to_string(), Arc::downgrade(&lock));
                    lock
                }
            }
        };
        debug!(key, "acquiring lock");
        let guard = lock.lock_owned().await;
        debug!(key, "lock acquired");
        guard
    }
}
