use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// Per-ticket mutual exclusion. Triage and approval for the same ticket
/// serialize on one async mutex; different tickets never contend.
#[derive(Clone, Default)]
pub struct TicketLocks {
    inner: Arc<Mutex<HashMap<Uuid, Arc<Mutex<()>>>>>,
}

impl TicketLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, ticket_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            // Strong count 1 means no guard held and no waiter: only the
            // map itself still references the lock, so the entry is dead.
            map.retain(|id, lock| *id == ticket_id || Arc::strong_count(lock) > 1);
            map.entry(ticket_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_ticket_serializes() {
        let locks = TicketLocks::new();
        let id = Uuid::new_v4();
        let guard = locks.acquire(id).await;
        let second = {
            let locks = locks.clone();
            tokio::spawn(async move { locks.acquire(id).await })
        };
        // The second acquire must still be pending while the guard is held.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!second.is_finished());
        drop(guard);
        second.await.unwrap();
    }

    #[tokio::test]
    async fn different_tickets_do_not_contend() {
        let locks = TicketLocks::new();
        let _a = locks.acquire(Uuid::new_v4()).await;
        let _b = locks.acquire(Uuid::new_v4()).await;
    }

    #[tokio::test]
    async fn released_entries_are_evicted() {
        let locks = TicketLocks::new();
        let released = Uuid::new_v4();
        drop(locks.acquire(released).await);

        let held = Uuid::new_v4();
        let _guard = locks.acquire(held).await;
        // A later acquire sweeps the idle entry but keeps the held one.
        drop(locks.acquire(Uuid::new_v4()).await);

        let map = locks.inner.lock().await;
        assert!(!map.contains_key(&released));
        assert!(map.contains_key(&held));
    }
}
