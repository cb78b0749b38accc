use std::{
    collections::{HashMap, HashSet},
    sync::Mutex,
};

use shared::{
    domain::{ConnectionId, ProjectId, UserId},
    protocol::ServerEvent,
};
use tokio::sync::mpsc;

pub type EventSender = mpsc::UnboundedSender<ServerEvent>;

struct ConnectionEntry {
    identity: UserId,
    sender: EventSender,
    rooms: HashSet<ProjectId>,
}

#[derive(Default)]
struct RegistryInner {
    connections: HashMap<ConnectionId, ConnectionEntry>,
    rooms: HashMap<ProjectId, HashSet<ConnectionId>>,
}

/// In-memory bookkeeping of live connections and their room membership.
///
/// Process-local: a multi-instance deployment needs an inter-process relay
/// on top of this, it is not shared state.
#[derive(Default)]
pub struct ConnectionRegistry {
    inner: Mutex<RegistryInner>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mints a handle for a verified identity. Called once per successful
    /// handshake; the handle owns the connection until `deregister`.
    pub fn register(&self, identity: UserId, sender: EventSender) -> ConnectionId {
        let connection_id = ConnectionId::generate();
        let mut inner = self.inner.lock().expect("registry mutex poisoned");
        inner.connections.insert(
            connection_id,
            ConnectionEntry {
                identity,
                sender,
                rooms: HashSet::new(),
            },
        );
        connection_id
    }

    /// Drops the connection and removes it from every room it joined.
    /// Returns the identity it carried, if the handle was still live.
    pub fn deregister(&self, connection_id: ConnectionId) -> Option<UserId> {
        let mut inner = self.inner.lock().expect("registry mutex poisoned");
        let entry = inner.connections.remove(&connection_id)?;
        for room in &entry.rooms {
            if let Some(members) = inner.rooms.get_mut(room) {
                members.remove(&connection_id);
                if members.is_empty() {
                    inner.rooms.remove(room);
                }
            }
        }
        Some(entry.identity)
    }

    /// Idempotent; joining a room twice is a no-op.
    pub fn join(&self, connection_id: ConnectionId, room: &ProjectId) {
        let mut inner = self.inner.lock().expect("registry mutex poisoned");
        if let Some(entry) = inner.connections.get_mut(&connection_id) {
            entry.rooms.insert(room.clone());
        } else {
            return;
        }
        inner
            .rooms
            .entry(room.clone())
            .or_default()
            .insert(connection_id);
    }

    /// Idempotent; leaving a room never joined is a no-op.
    pub fn leave(&self, connection_id: ConnectionId, room: &ProjectId) {
        let mut inner = self.inner.lock().expect("registry mutex poisoned");
        if let Some(entry) = inner.connections.get_mut(&connection_id) {
            entry.rooms.remove(room);
        }
        if let Some(members) = inner.rooms.get_mut(room) {
            members.remove(&connection_id);
            if members.is_empty() {
                inner.rooms.remove(room);
            }
        }
    }

    pub fn identity(&self, connection_id: ConnectionId) -> Option<UserId> {
        let inner = self.inner.lock().expect("registry mutex poisoned");
        inner
            .connections
            .get(&connection_id)
            .map(|entry| entry.identity.clone())
    }

    pub fn is_member(&self, connection_id: ConnectionId, room: &ProjectId) -> bool {
        let inner = self.inner.lock().expect("registry mutex poisoned");
        inner
            .rooms
            .get(room)
            .is_some_and(|members| members.contains(&connection_id))
    }

    pub(crate) fn sender(&self, connection_id: ConnectionId) -> Option<EventSender> {
        let inner = self.inner.lock().expect("registry mutex poisoned");
        inner
            .connections
            .get(&connection_id)
            .map(|entry| entry.sender.clone())
    }

    pub(crate) fn room_senders(
        &self,
        room: &ProjectId,
        exclude: Option<ConnectionId>,
    ) -> Vec<EventSender> {
        let inner = self.inner.lock().expect("registry mutex poisoned");
        let Some(members) = inner.rooms.get(room) else {
            return Vec::new();
        };
        members
            .iter()
            .filter(|id| Some(**id) != exclude)
            .filter_map(|id| inner.connections.get(id))
            .map(|entry| entry.sender.clone())
            .collect()
    }
}
