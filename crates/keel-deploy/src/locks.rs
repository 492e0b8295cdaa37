//! Per-app mutual exclusion.
//!
//! The scheduler's list-then-act submit is not safe against a concurrent
//! submit for the same app, so everything that mutates an app's services
//! runs under that app's lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LockMap = HashMap<String, Arc<AsyncMutex<()>>>;

/// A set of async mutexes keyed by app ID.
///
/// Entries are created on first use and dropped again once nobody holds
/// or waits for them.
#[derive(Clone, Default)]
pub struct AppLocks {
    locks: Arc<Mutex<LockMap>>,
}

impl AppLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `app_id`. Released when the guard drops.
    pub async fn lock(&self, app_id: &str) -> AppLockGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(app_id.to_string()).or_default().clone()
        };
        AppLockGuard {
            guard: Some(lock.lock_owned().await),
            app_id: app_id.to_string(),
            locks: self.locks.clone(),
        }
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Exclusive access to one app.
pub struct AppLockGuard {
    guard: Option<OwnedMutexGuard<()>>,
    app_id: String,
    locks: Arc<Mutex<LockMap>>,
}

impl Drop for AppLockGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Only the map's own reference left: no holder, no waiter.
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(&self.app_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.app_id);
        }
    }
}
