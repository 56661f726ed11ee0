//! Per-conversation serialization.
//!
//! Each conversation key maps to an async mutex held from transcript fetch
//! through save, so two exchanges on the same key in this process run one
//! after the other instead of overwriting each other's turns.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Map of conversation key to its exchange lock.
#[derive(Debug, Default)]
pub struct KeyLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

/// Held while an exchange owns its conversation key.
///
/// Dropping the guard releases the key and forgets the lock entry when no
/// other exchange is waiting on it.
pub struct KeyGuard<'a> {
    owner: &'a KeyLocks,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until `key` is free and take it.
    ///
    /// The returned guard exists before the wait starts, so a caller that is
    /// cancelled while waiting still runs the entry cleanup on drop.
    pub async fn acquire(&self, key: &str) -> KeyGuard<'_> {
        let lock = self
            .locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let mut key_guard = KeyGuard {
            owner: self,
            key: key.to_string(),
            guard: None,
        };
        key_guard.guard = Some(lock.lock_owned().await);
        key_guard
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        // Release the mutex first so its Arc is only held by the map and by
        // waiters that already cloned it.
        self.guard.take();
        self.owner
            .locks
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn entry_is_removed_after_release() {
        let locks = KeyLocks::new();
        {
            let _g = locks.acquire("a").await;
            assert_eq!(locks.len(), 1);
        }
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn same_key_is_exclusive() {
        let locks = Arc::new(KeyLocks::new());
        let first = locks.acquire("a").await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _g = locks.acquire("a").await;
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished(), "second acquire should wait");

        drop(first);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should finish after release")
            .unwrap();
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn cancelled_waiter_does_not_leak_entry() {
        let locks = KeyLocks::new();
        let holder = locks.acquire("a").await;

        let mut waiter = Box::pin(locks.acquire("a"));
        let polled = tokio::time::timeout(Duration::from_millis(20), &mut waiter).await;
        assert!(polled.is_err(), "waiter should still be blocked");

        drop(holder);
        assert_eq!(locks.len(), 1, "waiter still references the entry");
        drop(waiter);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn waiter_cancelled_after_holder_release_does_not_leak_entry() {
        let locks = KeyLocks::new();
        let holder = locks.acquire("a").await;

        let mut waiter = Box::pin(locks.acquire("a"));
        let polled = tokio::time::timeout(Duration::from_millis(20), &mut waiter).await;
        assert!(polled.is_err());

        drop(waiter);
        assert_eq!(locks.len(), 1, "holder still owns the entry");
        drop(holder);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn different_keys_do_not_block() {
        let locks = KeyLocks::new();
        let _a = locks.acquire("a").await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.acquire("b")).await;
        assert!(b.is_ok());
        assert_eq!(locks.len(), 2);
    }
}
