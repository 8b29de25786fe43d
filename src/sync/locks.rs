//! Per-key async mutual exclusion.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async lock per document key.
///
/// Entries are created on demand and removed when the last holder or waiter
/// goes away, including waiters whose `lock` future is dropped before it
/// completes, so the map only grows with concurrently used keys.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<String, Entry>>,
}

#[derive(Debug, Default)]
struct Entry {
    mutex: Arc<AsyncMutex<()>>,
    /// Holders plus waiters.
    users: usize,
}

/// Held lock for one key. Dropping it releases the key.
#[derive(Debug)]
pub struct KeyGuard<'a> {
    // Field order matters: the mutex is released before the entry is
    // unregistered.
    _guard: OwnedMutexGuard<()>,
    _registration: Registration<'a>,
}

/// Counts one user of a key for as long as it lives.
#[derive(Debug)]
struct Registration<'a> {
    owner: &'a KeyedLocks,
    key: String,
}

impl KeyedLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`.
    pub async fn lock(&self, key: &str) -> KeyGuard<'_> {
        let (registration, mutex) = {
            let mut locks = self.locks.lock();
            let entry = locks.entry(key.to_string()).or_default();
            entry.users += 1;
            (
                Registration {
                    owner: self,
                    key: key.to_string(),
                },
                Arc::clone(&entry.mutex),
            )
        };

        let guard = mutex.lock_owned().await;
        KeyGuard {
            _guard: guard,
            _registration: registration,
        }
    }

    /// Keys currently held or awaited.
    #[must_use]
    pub fn active_keys(&self) -> usize {
        self.locks.lock().len()
    }
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        let mut locks = self.owner.locks.lock();
        if let Some(entry) = locks.get_mut(&self.key) {
            entry.users -= 1;
            if entry.users == 0 {
                locks.remove(&self.key);
            }
        }
    }
}
