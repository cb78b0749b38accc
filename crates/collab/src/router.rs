use std::{sync::Arc, time::Duration};

use shared::{
    domain::{ConnectionId, UserId},
    protocol::{ClientEvent, ServerEvent},
};
use store::KeyValueStore;
use tracing::{debug, info};

use crate::{
    broadcast::RoomBroadcaster,
    lock::LockManager,
    presence::PresenceTracker,
    registry::{ConnectionRegistry, EventSender},
};

/// Dispatches inbound client events to the registry, presence tracker and
/// lock manager, and emits the resulting outbound events.
pub struct EventRouter {
    registry: Arc<ConnectionRegistry>,
    broadcaster: RoomBroadcaster,
    presence: PresenceTracker,
    locks: LockManager,
}

impl EventRouter {
    pub fn new(store: Arc<dyn KeyValueStore>, presence_ttl: Duration, lock_ttl: Duration) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = RoomBroadcaster::new(registry.clone());
        Self {
            registry,
            broadcaster,
            presence: PresenceTracker::new(store.clone(), presence_ttl),
            locks: LockManager::new(store, lock_ttl),
        }
    }

    pub fn broadcaster(&self) -> &RoomBroadcaster {
        &self.broadcaster
    }

    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    /// Registers a connection whose identity the handshake already
    /// verified, and records it online.
    pub async fn connect(&self, identity: UserId, sender: EventSender) -> ConnectionId {
        let connection_id = self.registry.register(identity.clone(), sender);
        self.presence.mark_online(&identity, connection_id).await;
        info!(%identity, connection = %connection_id, "client connected");
        connection_id
    }

    /// Tears the connection down: removes it from every room and
    /// best-effort deletes its presence record.
    pub async fn disconnect(&self, connection_id: ConnectionId) {
        if let Some(identity) = self.registry.deregister(connection_id) {
            self.presence.mark_offline(&identity).await;
            info!(%identity, connection = %connection_id, "client disconnected");
        }
    }

    pub async fn handle_event(&self, connection_id: ConnectionId, event: ClientEvent) {
        match event {
            ClientEvent::JoinProject { project_id } => {
                self.registry.join(connection_id, &project_id);
                debug!(connection = %connection_id, %project_id, "joined project room");
            }
            ClientEvent::LeaveProject { project_id } => {
                self.registry.leave(connection_id, &project_id);
                debug!(connection = %connection_id, %project_id, "left project room");
            }
            ClientEvent::TaskMoved {
                task_id,
                project_id,
                phase,
            } => {
                // Pure relay: the move was persisted by the CRUD layer
                // before the client emitted this. Peers in the room get the
                // notification, the sender already knows.
                if !self.registry.is_member(connection_id, &project_id) {
                    debug!(connection = %connection_id, %project_id, "task_moved from non-member dropped");
                    return;
                }
                self.broadcaster.broadcast(
                    &project_id,
                    &ServerEvent::TaskUpdated {
                        task_id,
                        project_id: project_id.clone(),
                        phase,
                    },
                    Some(connection_id),
                );
            }
            ClientEvent::LockTask {
                task_id,
                project_id,
            } => {
                let Some(identity) = self.registry.identity(connection_id) else {
                    return;
                };
                if self.locks.try_acquire(&task_id, &identity).await {
                    self.broadcaster.broadcast(
                        &project_id,
                        &ServerEvent::TaskLocked {
                            task_id: task_id.clone(),
                            locked_by: identity,
                        },
                        Some(connection_id),
                    );
                    self.broadcaster
                        .send_to(connection_id, ServerEvent::LockAcquired { task_id });
                } else {
                    self.broadcaster
                        .send_to(connection_id, ServerEvent::LockDenied { task_id });
                }
            }
            ClientEvent::UnlockTask {
                task_id,
                project_id,
            } => {
                let Some(identity) = self.registry.identity(connection_id) else {
                    return;
                };
                // A non-holder unlock is a normal denial, not an error:
                // nothing is broadcast and the lock stands.
                if self.locks.release(&task_id, &identity).await {
                    self.broadcaster.broadcast(
                        &project_id,
                        &ServerEvent::TaskUnlocked { task_id },
                        Some(connection_id),
                    );
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/router_tests.rs"]
mod tests;
