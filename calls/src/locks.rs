//! Keyed mutual exclusion for calls and accounts.

use crate::types::{CallId, UserId};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Idle slots are dropped once the table grows past this size
const PRUNE_THRESHOLD: usize = 1024;

/// One async mutex per key, created on first use
///
/// Different keys never contend. A slot is only pruned when nobody holds or
/// waits on it, which is checked under the table lock.
#[derive(Debug)]
pub struct KeyedLocks<K> {
    slots: Mutex<HashMap<K, Arc<Mutex<()>>>>,
}

/// Serializes mutations of the same call
pub type CallLocks = KeyedLocks<CallId>;

/// Serializes balance batches touching the same account
pub type AccountLocks = KeyedLocks<UserId>;

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash + Ord + Copy> KeyedLocks<K> {
    /// Creates an empty lock table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`
    pub async fn acquire(&self, key: K) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = self.slots.lock().await;
            if slots.len() >= PRUNE_THRESHOLD {
                slots.retain(|_, slot| Arc::strong_count(slot) > 1);
            }
            Arc::clone(slots.entry(key).or_default())
        };
        slot.lock_owned().await
    }

    /// Wait for exclusive access to every key in `keys`
    ///
    /// Keys are locked once each in ascending order, so two callers with
    /// overlapping key sets cannot deadlock.
    pub async fn acquire_all(&self, keys: impl IntoIterator<Item = K>) -> Vec<OwnedMutexGuard<()>> {
        let mut keys: Vec<K> = keys.into_iter().collect();
        keys.sort_unstable();
        keys.dedup();

        let mut guards = Vec::with_capacity(keys.len());
        for key in keys {
            guards.push(self.acquire(key).await);
        }
        guards
    }

    /// Number of slots currently tracked
    pub async fn tracked(&self) -> usize {
        self.slots.lock().await.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_call_is_exclusive() {
        let locks = Arc::new(CallLocks::new());
        let id = CallId::new();

        let guard = locks.acquire(id).await;
        let contender = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.acquire(id).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn different_calls_do_not_contend() {
        let locks = CallLocks::new();
        let _first = locks.acquire(CallId::new()).await;
        let second = tokio::time::timeout(Duration::from_millis(100), locks.acquire(CallId::new()))
            .await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn idle_slots_are_pruned() {
        let locks = CallLocks::new();
        let held = CallId::new();
        let _guard = locks.acquire(held).await;

        for _ in 0..PRUNE_THRESHOLD {
            drop(locks.acquire(CallId::new()).await);
        }
        let _ = locks.acquire(CallId::new()).await;

        assert!(locks.tracked().await < PRUNE_THRESHOLD);
    }

    #[tokio::test]
    async fn acquire_all_locks_each_key_once() {
        let locks = Arc::new(AccountLocks::new());
        let (a, b) = (UserId::new(), UserId::new());

        let guards = locks.acquire_all([b, a, b]).await;
        assert_eq!(guards.len(), 2);

        let contender = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guards = locks.acquire_all([a, b]).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guards);
        tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .unwrap()
            .unwrap();
    }
}
