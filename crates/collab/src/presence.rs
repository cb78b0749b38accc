use std::{sync::Arc, time::Duration};

use shared::domain::{ConnectionId, UserId};
use store::{KeyValueStore, StoreError};
use tracing::warn;

pub const DEFAULT_PRESENCE_TTL: Duration = Duration::from_secs(3600);

/// Best-effort online/offline signal per identity, backed by the expiring
/// store so presence self-heals when a process dies without a clean
/// disconnect. Not a correctness-critical record: writes that fail are
/// logged and skipped, the TTL is the fallback.
#[derive(Clone)]
pub struct PresenceTracker {
    store: Arc<dyn KeyValueStore>,
    ttl: Duration,
}

impl PresenceTracker {
    pub fn new(store: Arc<dyn KeyValueStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    fn key(identity: &UserId) -> String {
        format!("user:online:{identity}")
    }

    /// Upserts the record for this identity. Last connection wins: an
    /// identity connected from two sessions counts as one presence.
    pub async fn mark_online(&self, identity: &UserId, connection_id: ConnectionId) {
        let key = Self::key(identity);
        if let Err(err) = self
            .store
            .set(&key, &connection_id.to_string(), self.ttl)
            .await
        {
            warn!(%identity, error = %err, "presence write failed, relying on ttl expiry");
        }
    }

    pub async fn mark_offline(&self, identity: &UserId) {
        let key = Self::key(identity);
        if let Err(err) = self.store.delete(&key).await {
            warn!(%identity, error = %err, "presence delete failed, relying on ttl expiry");
        }
    }

    /// Returns the recorded connection id when the identity is online.
    pub async fn lookup(&self, identity: &UserId) -> Result<Option<String>, StoreError> {
        self.store.get(&Self::key(identity)).await
    }
}
