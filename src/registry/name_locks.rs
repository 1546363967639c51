/*!
 * Keyed async locks
 *
 * One tokio mutex per key, created on demand and dropped again once nobody
 * holds or waits on it. A writer locks every key it touches in sorted order,
 * so two writers with overlapping key sets never deadlock and writers with
 * disjoint sets never wait on each other.
 */

use dashmap::DashMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Default)]
pub struct KeyedLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock every key in `keys`; released when the guard drops
    pub async fn acquire(&self, keys: BTreeSet<String>) -> KeyedGuard<'_> {
        let mut guards = Vec::with_capacity(keys.len());
        for key in &keys {
            let lock = Arc::clone(self.locks.entry(key.clone()).or_default().value());
            guards.push(lock.lock_owned().await);
        }
        KeyedGuard {
            owner: self,
            keys,
            guards,
        }
    }

    /// Keys with a live mutex
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

pub struct KeyedGuard<'a> {
    owner: &'a KeyedLocks,
    keys: BTreeSet<String>,
    guards: Vec<OwnedMutexGuard<()>>,
}

impl KeyedGuard<'_> {
    pub fn keys(&self) -> &BTreeSet<String> {
        &self.keys
    }

    /// Whether every key in `keys` is held by this guard
    pub fn covers(&self, keys: &BTreeSet<String>) -> bool {
        keys.is_subset(&self.keys)
    }
}

impl Drop for KeyedGuard<'_> {
    fn drop(&mut self) {
        self.guards.clear();
        // the map holds one reference; anything above that is a waiter
        for key in &self.keys {
            self.owner
                .locks
                .remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
        }
    }
}
