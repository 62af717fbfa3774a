use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One async mutex per room, created on first use.
#[derive(Default)]
pub struct RoomLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl RoomLocks {
    /// Wait for exclusive use of the room. The map lock is released before waiting.
    pub async fn lock(&self, room_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            Arc::clone(locks.entry(room_id.to_string()).or_default())
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_room_is_exclusive() {
        let locks = Arc::new(RoomLocks::default());
        let held = locks.lock("room-1").await;

        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.lock("room-1").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(held);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn rooms_do_not_block_each_other() {
        let locks = RoomLocks::default();
        let _one = locks.lock("room-1").await;
        tokio::time::timeout(Duration::from_secs(1), locks.lock("room-2"))
            .await
            .unwrap();
    }
}
