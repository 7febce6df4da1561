//! Live connections, the user each one is bound to, and the rooms it has
//! joined.

use std::{collections::HashSet, sync::Arc};

use dashmap::DashMap;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::{db::UserId, error::ChatError};

use super::{ConnectionId, Room};

/// Serialized frames waiting to be written to one socket.
pub type Outbox = mpsc::Sender<Arc<str>>;

struct ConnectionEntry {
    user_id: UserId,
    rooms: HashSet<Room>,
    outbox: Outbox,
}

/// Outcome of removing a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Departure {
    pub user_id: UserId,
    /// The user has no live connection left.
    pub last: bool,
}

/// Lock order is `connections` then `rooms`; a room set is never held while
/// a connection entry is taken.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, ConnectionEntry>,
    rooms: DashMap<Room, HashSet<ConnectionId>>,
    users: DashMap<UserId, HashSet<ConnectionId>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a connection to its user and joins it to the user's own room.
    /// Returns true when this is the user's first live connection.
    pub fn register(&self, id: ConnectionId, user_id: UserId, outbox: Outbox) -> bool {
        let own_room = Room::User(user_id);
        let entry = ConnectionEntry {
            user_id,
            rooms: HashSet::from([own_room]),
            outbox,
        };
        let held = self.connections.entry(id).insert(entry);
        self.rooms.entry(own_room).or_default().insert(id);
        drop(held);

        let mut user_conns = self.users.entry(user_id).or_default();
        let first = user_conns.is_empty();
        user_conns.insert(id);

        tracing::debug!(connection = %id, user_id, first, "registered connection");
        first
    }

    /// Drops the connection and every room membership it held. Unknown ids
    /// are a no-op.
    pub fn unregister(&self, id: ConnectionId) -> Option<Departure> {
        let (_, entry) = self.connections.remove(&id)?;

        for room in &entry.rooms {
            if let Some(mut members) = self.rooms.get_mut(room) {
                members.remove(&id);
            }
            self.rooms.remove_if(room, |_, members| members.is_empty());
        }

        let last = match self.users.get_mut(&entry.user_id) {
            Some(mut conns) => {
                conns.remove(&id);
                conns.is_empty()
            }
            None => true,
        };
        if last {
            self.users.remove_if(&entry.user_id, |_, conns| conns.is_empty());
        }

        tracing::debug!(connection = %id, user_id = entry.user_id, last, "unregistered connection");
        Some(Departure {
            user_id: entry.user_id,
            last,
        })
    }

    /// Adds a room membership. Returns false when nothing changed, either
    /// because the connection is already in the room or because it is gone.
    pub fn join_room(&self, id: ConnectionId, room: Room) -> Result<bool, ChatError> {
        let Some(mut entry) = self.connections.get_mut(&id) else {
            return Ok(false);
        };

        if let Room::User(owner) = room {
            if owner != entry.user_id {
                return Err(ChatError::permission("cannot join another user's room"));
            }
        }

        if !entry.rooms.insert(room) {
            return Ok(false);
        }
        // still holding the connection entry, so unregister sees this room
        self.rooms.entry(room).or_default().insert(id);
        Ok(true)
    }

    /// Removes a room membership; leaving a room twice is fine. The
    /// connection's own user room cannot be left.
    pub fn leave_room(&self, id: ConnectionId, room: Room) -> bool {
        let Some(mut entry) = self.connections.get_mut(&id) else {
            return false;
        };
        if room == Room::User(entry.user_id) || !entry.rooms.remove(&room) {
            return false;
        }

        if let Some(mut members) = self.rooms.get_mut(&room) {
            members.remove(&id);
        }
        drop(entry);
        self.rooms.remove_if(&room, |_, members| members.is_empty());
        true
    }

    pub fn joined_rooms(&self, id: ConnectionId) -> HashSet<Room> {
        self.connections
            .get(&id)
            .map(|entry| entry.rooms.clone())
            .unwrap_or_default()
    }

    pub fn connections_in_room(&self, room: Room) -> Vec<ConnectionId> {
        self.rooms
            .get(&room)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn all_connections(&self) -> Vec<ConnectionId> {
        self.connections.iter().map(|entry| *entry.key()).collect()
    }

    pub fn connections_for_user(&self, user_id: UserId) -> Vec<ConnectionId> {
        self.users
            .get(&user_id)
            .map(|conns| conns.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn user_of(&self, id: ConnectionId) -> Option<UserId> {
        self.connections.get(&id).map(|entry| entry.user_id)
    }

    pub fn is_online(&self, user_id: UserId) -> bool {
        self.users
            .get(&user_id)
            .is_some_and(|conns| !conns.is_empty())
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Queues a frame on one connection. False when the connection is gone,
    /// its socket task has ended, or its queue is full.
    pub fn send(&self, id: ConnectionId, frame: Arc<str>) -> bool {
        let Some(outbox) = self.connections.get(&id).map(|entry| entry.outbox.clone()) else {
            return false;
        };

        match outbox.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(connection = %id, "outbox full, dropping event");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outbox() -> (Outbox, mpsc::Receiver<Arc<str>>) {
        mpsc::channel(16)
    }

    #[test]
    fn register_joins_own_user_room() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = outbox();
        let id = ConnectionId::new();

        assert!(registry.register(id, 1, tx));
        assert_eq!(registry.joined_rooms(id), HashSet::from([Room::User(1)]));
        assert_eq!(registry.connections_in_room(Room::User(1)), vec![id]);
        assert_eq!(registry.user_of(id), Some(1));
        assert!(registry.is_online(1));
    }

    #[test]
    fn first_and_last_connection_of_a_user() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = outbox();
        let (a, b) = (ConnectionId::new(), ConnectionId::new());

        assert!(registry.register(a, 1, tx.clone()));
        assert!(!registry.register(b, 1, tx));

        assert_eq!(registry.unregister(a), Some(Departure { user_id: 1, last: false }));
        assert!(registry.is_online(1));
        assert_eq!(registry.unregister(b), Some(Departure { user_id: 1, last: true }));
        assert!(!registry.is_online(1));
    }

    #[test]
    fn unregister_unknown_is_noop() {
        let registry = ConnectionRegistry::new();
        assert_eq!(registry.unregister(ConnectionId::new()), None);
    }

    #[test]
    fn unregister_leaves_no_stale_room_entries() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = outbox();
        let id = ConnectionId::new();
        registry.register(id, 1, tx);
        registry.join_room(id, Room::Channel(7)).unwrap();

        registry.unregister(id);

        assert!(registry.connections_in_room(Room::Channel(7)).is_empty());
        assert!(registry.connections_in_room(Room::User(1)).is_empty());
        assert!(registry.joined_rooms(id).is_empty());
        assert_eq!(registry.connection_count(), 0);
    }

    #[test]
    fn join_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = outbox();
        let id = ConnectionId::new();
        registry.register(id, 1, tx);

        assert!(registry.join_room(id, Room::Channel(7)).unwrap());
        assert!(!registry.join_room(id, Room::Channel(7)).unwrap());
        assert_eq!(registry.connections_in_room(Room::Channel(7)), vec![id]);
    }

    #[test]
    fn leave_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = outbox();
        let id = ConnectionId::new();
        registry.register(id, 1, tx);
        registry.join_room(id, Room::Channel(7)).unwrap();

        assert!(registry.leave_room(id, Room::Channel(7)));
        assert!(!registry.leave_room(id, Room::Channel(7)));
        assert!(!registry.leave_room(id, Room::Channel(7)));
        assert!(registry.connections_in_room(Room::Channel(7)).is_empty());
    }

    #[test]
    fn own_user_room_cannot_be_left() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = outbox();
        let id = ConnectionId::new();
        registry.register(id, 1, tx);

        assert!(!registry.leave_room(id, Room::User(1)));
        assert!(registry.joined_rooms(id).contains(&Room::User(1)));
    }

    #[test]
    fn other_users_room_is_forbidden() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = outbox();
        let id = ConnectionId::new();
        registry.register(id, 1, tx);

        assert!(matches!(
            registry.join_room(id, Room::User(2)),
            Err(ChatError::Permission(_))
        ));
    }

    #[test]
    fn join_after_disconnect_is_noop() {
        let registry = ConnectionRegistry::new();
        let id = ConnectionId::new();
        assert!(!registry.join_room(id, Room::Channel(7)).unwrap());
        assert!(registry.connections_in_room(Room::Channel(7)).is_empty());
    }

    #[tokio::test]
    async fn send_reaches_outbox() {
        let registry = ConnectionRegistry::new();
        let (tx, mut rx) = outbox();
        let id = ConnectionId::new();
        registry.register(id, 1, tx);

        assert!(registry.send(id, Arc::from("hello")));
        assert_eq!(&*rx.recv().await.unwrap(), "hello");
    }

    #[test]
    fn send_to_gone_connection_is_noop() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = outbox();
        let id = ConnectionId::new();
        registry.register(id, 1, tx);
        registry.unregister(id);

        assert!(!registry.send(id, Arc::from("late")));
    }

    #[test]
    fn send_to_full_outbox_drops() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::channel(1);
        let id = ConnectionId::new();
        registry.register(id, 1, tx);

        assert!(registry.send(id, Arc::from("one")));
        assert!(!registry.send(id, Arc::from("two")));
    }

    #[test]
    fn connections_for_user_lists_every_device() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = outbox();
        let (a, b, c) = (ConnectionId::new(), ConnectionId::new(), ConnectionId::new());
        registry.register(a, 1, tx.clone());
        registry.register(b, 1, tx.clone());
        registry.register(c, 2, tx);

        let mut mine = registry.connections_for_user(1);
        mine.sort();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(mine, expected);
        assert_eq!(registry.all_connections().len(), 3);
    }
}
