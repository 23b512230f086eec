//! Per-episode locking.
//!
//! Status changes on the same episode are serialized through a fixed table of
//! mutexes indexed by a hash of the episode identity. Two episodes may share a
//! stripe, which only costs some parallelism. Callers hold one stripe at a
//! time.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use tokio::sync::{Mutex, MutexGuard};

use crate::db::models::EpisodeNumber;

const DEFAULT_STRIPES: usize = 64;

pub struct EpisodeLocks {
    stripes: Vec<Mutex<()>>,
}

impl EpisodeLocks {
    pub fn new() -> Self {
        Self::with_stripes(DEFAULT_STRIPES)
    }

    pub fn with_stripes(count: usize) -> Self {
        let count = count.max(1);
        Self {
            stripes: (0..count).map(|_| Mutex::new(())).collect(),
        }
    }

    /// Waits for the lock guarding `(show_id, number)`.
    pub async fn lock(&self, show_id: i64, number: EpisodeNumber) -> MutexGuard<'_, ()> {
        self.stripes[self.stripe_for(show_id, number)].lock().await
    }

    fn stripe_for(&self, show_id: i64, number: EpisodeNumber) -> usize {
        let mut hasher = DefaultHasher::new();
        (show_id, number.season, number.episode).hash(&mut hasher);
        (hasher.finish() % self.stripes.len() as u64) as usize
    }
}

impl Default for EpisodeLocks {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_stripe_is_stable() {
        let locks = EpisodeLocks::new();
        let n = EpisodeNumber::new(2, 5);
        assert_eq!(locks.stripe_for(7, n), locks.stripe_for(7, n));
        assert!(locks.stripe_for(7, n) < DEFAULT_STRIPES);
    }

    #[tokio::test]
    async fn test_same_episode_is_serialized() {
        let locks = Arc::new(EpisodeLocks::with_stripes(4));
        let n = EpisodeNumber::new(1, 1);

        let guard = locks.lock(1, n).await;

        let other = locks.clone();
        let waiter = tokio::spawn(async move {
            let _guard = other.lock(1, n).await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
