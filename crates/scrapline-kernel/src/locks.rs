//! Per-transaction write serialization.
//!
//! Every mutating operation holds the transaction's lock for its whole
//! load-check-save sequence. Repository saves are also version-checked, so a
//! writer that bypasses the registry still cannot advance a stage twice.

use std::sync::Arc;

use dashmap::DashMap;
use scrapline_types::TransactionId;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Registry of one async mutex per transaction id.
#[derive(Clone, Default)]
pub struct TransactionLocks {
    locks: Arc<DashMap<TransactionId, Arc<Mutex<()>>>>,
}

impl TransactionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `id`. Released when the guard drops.
    pub async fn acquire(&self, id: TransactionId) -> TransactionGuard {
        // Clone the Arc out so the map shard is not held across the await.
        let lock = self
            .locks
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        TransactionGuard {
            id,
            guard: Some(lock.lock_owned().await),
            locks: self.locks.clone(),
        }
    }

    /// Number of transactions currently held or waited on.
    pub fn tracked(&self) -> usize {
        self.locks.len()
    }
}

/// Exclusive access to one transaction. The registry entry is evicted when
/// the last holder or waiter is gone.
pub struct TransactionGuard {
    id: TransactionId,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<DashMap<TransactionId, Arc<Mutex<()>>>>,
}

impl Drop for TransactionGuard {
    fn drop(&mut self) {
        // Release the mutex first so its Arc no longer counts as a holder.
        self.guard.take();
        // Waiters hold their own clone; the map's copy alone means idle.
        self.locks
            .remove_if(&self.id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl std::fmt::Debug for TransactionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionGuard").field("id", &self.id).finish()
    }
}

impl std::fmt::Debug for TransactionLocks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionLocks")
            .field("tracked", &self.tracked())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn same_id_is_serialized() {
        let locks = TransactionLocks::new();
        let id = TransactionId::new();
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let inside = inside.clone();
            let max_seen = max_seen.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire(id).await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert_eq!(locks.tracked(), 0);
    }

    #[tokio::test]
    async fn different_ids_do_not_block_each_other() {
        let locks = TransactionLocks::new();
        let a = locks.acquire(TransactionId::new()).await;
        let b = locks.acquire(TransactionId::new()).await;
        assert_eq!(locks.tracked(), 2);

        drop(a);
        assert_eq!(locks.tracked(), 1);
        drop(b);
        assert_eq!(locks.tracked(), 0);
    }

    #[tokio::test]
    async fn entry_survives_while_someone_waits() {
        let locks = TransactionLocks::new();
        let id = TransactionId::new();
        let held = locks.acquire(id).await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire(id).await;
            })
        };
        // Map, held guard, and the waiter's clone.
        while Arc::strong_count(locks.locks.get(&id).unwrap().value()) < 3 {
            tokio::task::yield_now().await;
        }

        drop(held);
        assert_eq!(locks.tracked(), 1);
        waiter.await.unwrap();
        assert_eq!(locks.tracked(), 0);
    }
}
