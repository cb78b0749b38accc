use std::{sync::Arc, time::Duration};

use shared::domain::{TaskId, UserId};
use store::KeyValueStore;
use tracing::warn;

pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(30);

/// Short-lived single-owner locks arbitrating concurrent task edits.
///
/// Acquisition is one atomic set-if-absent against the store; the TTL
/// bounds how long a crashed holder can keep a task locked. Release
/// verifies the holder immediately before deleting, so a straggling
/// release from a prior holder can never evict whoever holds the lock now.
#[derive(Clone)]
pub struct LockManager {
    store: Arc<dyn KeyValueStore>,
    ttl: Duration,
}

impl LockManager {
    pub fn new(store: Arc<dyn KeyValueStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    fn key(task_id: &TaskId) -> String {
        format!("task:lock:{task_id}")
    }

    /// True when this call created the lock record. A second acquire while
    /// the record is live is denied, including by the current holder.
    /// Store errors deny: granting without the atomic guarantee risks a
    /// double grant.
    pub async fn try_acquire(&self, task_id: &TaskId, identity: &UserId) -> bool {
        let key = Self::key(task_id);
        match self
            .store
            .set_if_absent(&key, identity.as_str(), self.ttl)
            .await
        {
            Ok(granted) => granted,
            Err(err) => {
                warn!(%task_id, %identity, error = %err, "lock acquire failed, denying");
                false
            }
        }
    }

    /// True when the record existed, named `identity` as holder, and was
    /// deleted. Any other outcome (absent, other holder, store error)
    /// leaves the record untouched and returns false; the TTL eventually
    /// clears a lock nobody can release.
    pub async fn release(&self, task_id: &TaskId, identity: &UserId) -> bool {
        let key = Self::key(task_id);
        let holder = match self.store.get(&key).await {
            Ok(holder) => holder,
            Err(err) => {
                warn!(%task_id, %identity, error = %err, "lock release failed, leaving record");
                return false;
            }
        };
        match holder {
            Some(holder) if holder == identity.as_str() => {
                match self.store.delete(&key).await {
                    Ok(()) => true,
                    Err(err) => {
                        warn!(%task_id, %identity, error = %err, "lock delete failed, leaving record");
                        false
                    }
                }
            }
            _ => false,
        }
    }
}

#[cfg(test)]
#[path = "tests/lock_tests.rs"]
mod tests;
