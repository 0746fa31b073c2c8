//! Per-key write serialization for ledger records

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::models::LedgerKey;

/// Idle entries are dropped once the table grows past this size
const PRUNE_THRESHOLD: usize = 1024;

/// One async mutex per ledger key, created on demand
#[derive(Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<LedgerKey, Arc<Mutex<()>>>>,
}

/// Guards held for the duration of one ledger mutation
pub struct LedgerGuard {
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock a single key
    pub async fn acquire(&self, key: &LedgerKey) -> LedgerGuard {
        self.acquire_all(std::slice::from_ref(key)).await
    }

    /// Lock several keys. Keys are taken in sorted order so two callers
    /// locking overlapping sets cannot deadlock. Duplicates are locked once.
    pub async fn acquire_all(&self, keys: &[LedgerKey]) -> LedgerGuard {
        let mut keys: Vec<&LedgerKey> = keys.iter().collect();
        keys.sort();
        keys.dedup();

        let mutexes: Vec<Arc<Mutex<()>>> = {
            let mut locks = self.locks.lock().await;
            if locks.len() > PRUNE_THRESHOLD {
                locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            keys.iter()
                .map(|key| {
                    Arc::clone(
                        locks
                            .entry((*key).clone())
                            .or_insert_with(|| Arc::new(Mutex::new(()))),
                    )
                })
                .collect()
        };

        let mut guards = Vec::with_capacity(mutexes.len());
        for mutex in mutexes {
            guards.push(mutex.lock_owned().await);
        }
        LedgerGuard { _guards: guards }
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }
}
