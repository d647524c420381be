//! Per-key lock set.
//!
//! Linearizes work on the same `(document, label)` while letting different
//! keys proceed in parallel. Several keys can be taken at once; they are
//! acquired atomically so two holders of overlapping sets cannot deadlock.

use std::collections::{BTreeSet, HashSet};
use std::sync::{Condvar, Mutex, MutexGuard};

#[derive(Debug, Default)]
pub struct KeyLocks {
    held: Mutex<HashSet<String>>,
    released: Condvar,
}

/// Releases its keys when dropped.
#[derive(Debug)]
pub struct KeyLockGuard<'a> {
    locks: &'a KeyLocks,
    keys: BTreeSet<String>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until every key is free, then takes all of them.
    pub fn lock_all<I>(&self, keys: I) -> KeyLockGuard<'_>
    where
        I: IntoIterator<Item = String>,
    {
        let keys: BTreeSet<String> = keys.into_iter().collect();
        let mut held = self.held_guard();
        while keys.iter().any(|k| held.contains(k)) {
            held = match self.released.wait(held) {
                Ok(guard) => guard,
                Err(poisoned) => {
                    log::warn!("Key lock set was poisoned, recovering");
                    poisoned.into_inner()
                }
            };
        }
        held.extend(keys.iter().cloned());
        KeyLockGuard { locks: self, keys }
    }

    pub fn lock(&self, key: String) -> KeyLockGuard<'_> {
        self.lock_all([key])
    }

    /// Number of keys currently held.
    pub fn held_count(&self) -> usize {
        self.held_guard().len()
    }

    fn held_guard(&self) -> MutexGuard<'_, HashSet<String>> {
        match self.held.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Key lock set was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

impl Drop for KeyLockGuard<'_> {
    fn drop(&mut self) {
        let mut held = self.locks.held_guard();
        for key in &self.keys {
            held.remove(key);
        }
        drop(held);
        self.locks.released.notify_all();
    }
}
