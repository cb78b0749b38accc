use std::sync::Arc;

use shared::{
    domain::{ConnectionId, ProjectId},
    protocol::ServerEvent,
};

use crate::registry::ConnectionRegistry;

/// Fans events out to a project room's current members.
///
/// Explicitly passed to whoever needs to push into a room (socket loop,
/// HTTP relay) rather than fetched from global state. Delivery is
/// best-effort per recipient: each connection has its own unbounded queue,
/// so a slow or dead peer never blocks the rest of the room.
#[derive(Clone)]
pub struct RoomBroadcaster {
    registry: Arc<ConnectionRegistry>,
}

impl RoomBroadcaster {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    pub fn broadcast(&self, room: &ProjectId, event: &ServerEvent, exclude: Option<ConnectionId>) {
        for sender in self.registry.room_senders(room, exclude) {
            // A closed receiver means the connection is tearing down; its
            // deregistration handles cleanup.
            let _ = sender.send(event.clone());
        }
    }

    /// Direct reply to a single connection, e.g. lock grant/denial.
    pub fn send_to(&self, connection_id: ConnectionId, event: ServerEvent) {
        if let Some(sender) = self.registry.sender(connection_id) {
            let _ = sender.send(event);
        }
    }
}
