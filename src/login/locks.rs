use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async lock per avatar identity, created on demand and dropped once
/// nobody holds or waits on it.
#[derive(Debug, Default)]
pub struct IdentityLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl IdentityLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, identity: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            // only the map holds it: idle
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(identity.to_string()).or_default())
        };

        lock.lock_owned().await
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn same_identity_is_serialized() {
        let locks = Arc::new(IdentityLocks::new());
        let held = locks.lock("ada lovelace").await;

        let contender = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.lock("ada lovelace").await;
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!contender.is_finished());

        drop(held);
        assert!(timeout(Duration::from_secs(1), contender).await.is_ok());
    }

    #[tokio::test]
    async fn different_identities_do_not_block() {
        let locks = IdentityLocks::new();
        let _ada = locks.lock("ada lovelace").await;

        let grace = timeout(Duration::from_millis(200), locks.lock("grace hopper")).await;
        assert!(grace.is_ok());
    }

    #[tokio::test]
    async fn idle_locks_are_pruned() {
        let locks = IdentityLocks::new();
        drop(locks.lock("ada lovelace").await);
        drop(locks.lock("grace hopper").await);

        // the next acquisition prunes both idle entries
        let _guard = locks.lock("alan turing").await;
        assert_eq!(locks.len(), 1);
    }
}
