use crate::config::USER_LOCK_PRUNE_THRESHOLD;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Keyed exclusive sections, one per user
///
/// Holding the guard serializes load, mutate and save for that user; other
/// users are never blocked.
#[derive(Default)]
pub struct UserLocks {
    table: Mutex<HashMap<i64, Arc<AsyncMutex<()>>>>,
}

impl UserLocks {
    /// Empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for and take the section of `user_id`
    pub async fn acquire(&self, user_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
            if table.len() > USER_LOCK_PRUNE_THRESHOLD {
                // Only the table holds an unused entry
                table.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            Arc::clone(table.entry(user_id).or_default())
        };
        lock.lock_owned().await
    }

    /// Number of tracked users
    #[must_use]
    pub fn len(&self) -> usize {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no user is tracked
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
