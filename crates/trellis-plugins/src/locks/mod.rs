//! Per-key mutual exclusion.
//!
//! [`KeyedLocks`] hands out one mutex per key so that work on the same plugin
//! is serialised while work on different plugins runs in parallel. The map of
//! mutexes is itself guarded by a single lock that is held only long enough
//! to look up or insert an entry.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};

/// A table of mutexes keyed by `K`.
#[derive(Debug)]
pub struct KeyedLocks<K> {
    locks: Mutex<HashMap<K, Arc<Mutex<()>>>>,
}

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, key: &K) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(key.clone()).or_default())
    }

    /// Runs `work` while holding the lock for `key`.
    ///
    /// A panic in an earlier holder does not poison later callers.
    pub fn with_lock<T>(&self, key: &K, work: impl FnOnce() -> T) -> T {
        let lock = self.lock_for(key);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        work()
    }
}
