use std::{collections::HashSet, sync::Arc};

use crate::{
    db::{ChannelId, UserId},
    error::{ChatError, ChatResult},
};

use super::{ConnectionId, ConnectionRegistry, Event, EventPayload, MembershipIndex, Room, Scope};

/// Resolves scopes to connections and pushes serialized events into their
/// outboxes. Delivery is best-effort and at-most-once.
pub struct EventRouter {
    registry: Arc<ConnectionRegistry>,
    membership: Arc<MembershipIndex>,
}

impl EventRouter {
    pub fn new(registry: Arc<ConnectionRegistry>, membership: Arc<MembershipIndex>) -> Self {
        Self {
            registry,
            membership,
        }
    }

    /// Returns how many connections accepted the event.
    pub fn deliver(&self, event: &Event) -> usize {
        let frame: Arc<str> = match serde_json::to_string(&event.payload) {
            Ok(frame) => frame.into(),
            Err(err) => {
                tracing::error!(kind = event.kind(), error = %err, "failed to serialize event");
                return 0;
            }
        };

        let targets = match event.scope {
            Scope::Room(room) => self.registry.connections_in_room(room),
            Scope::Connection(id) => vec![id],
            Scope::All => self.registry.all_connections(),
        };

        let skipped: HashSet<ConnectionId> = match event.exclude_origin {
            Some(origin) => {
                let mut skipped: HashSet<_> = self.registry.connections_for_user(origin.user_id).into_iter().collect();
                skipped.insert(origin.connection_id);
                skipped
            }
            None => HashSet::new(),
        };

        let delivered = targets
            .into_iter()
            .filter(|id| !skipped.contains(id))
            .filter(|id| self.registry.send(*id, frame.clone()))
            .count();

        tracing::trace!(kind = event.kind(), scope = %event.scope, delivered, "delivered event");
        delivered
    }

    /// Joins a connection to a channel room after checking membership, then
    /// confirms to that connection.
    pub async fn request_join(&self, connection_id: ConnectionId, channel_id: ChannelId) -> ChatResult<()> {
        let Some(user_id) = self.registry.user_of(connection_id) else {
            return Ok(());
        };
        if !self.membership.is_channel_member(channel_id, user_id).await? {
            return Err(ChatError::permission("not a member of this channel"));
        }

        self.registry.join_room(connection_id, Room::Channel(channel_id))?;
        self.deliver(&Event::new(
            EventPayload::JoinedChannel { channel_id },
            Scope::Connection(connection_id),
        ));
        Ok(())
    }

    pub fn request_leave(&self, connection_id: ConnectionId, channel_id: ChannelId) {
        self.registry.leave_room(connection_id, Room::Channel(channel_id));
        self.deliver(&Event::new(
            EventPayload::LeftChannel { channel_id },
            Scope::Connection(connection_id),
        ));
    }

    /// Joins every live connection of the user to the channel room. Returns
    /// how many connections were newly joined.
    pub fn auto_join(&self, user_id: UserId, channel_id: ChannelId) -> usize {
        self.registry
            .connections_for_user(user_id)
            .into_iter()
            .filter(|id| matches!(self.registry.join_room(*id, Room::Channel(channel_id)), Ok(true)))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use crate::db::{NewChannel, NewUser, Store};

    use super::*;

    struct Fixture {
        store: Store,
        registry: Arc<ConnectionRegistry>,
        router: EventRouter,
    }

    async fn fixture() -> Fixture {
        let store = Store::in_memory().await.unwrap();
        let registry = Arc::new(ConnectionRegistry::new());
        let membership = Arc::new(MembershipIndex::new(store.clone()));
        let router = EventRouter::new(registry.clone(), membership);
        Fixture {
            store,
            registry,
            router,
        }
    }

    async fn user(store: &Store, name: &str) -> UserId {
        store
            .create_user(NewUser {
                username: name,
                email: &format!("{name}@example.com"),
                password_hash: "x",
                display_name: None,
            })
            .await
            .unwrap()
            .id
    }

    fn connect(registry: &ConnectionRegistry, user_id: UserId) -> (ConnectionId, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(16);
        let id = ConnectionId::new();
        registry.register(id, user_id, tx);
        (id, rx)
    }

    fn drain(rx: &mut mpsc::Receiver<Arc<str>>) -> Vec<serde_json::Value> {
        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(serde_json::from_str(&frame).unwrap());
        }
        frames
    }

    fn status(user_id: UserId) -> EventPayload {
        EventPayload::UserStatusChange {
            user_id,
            status: crate::db::UserStatus::Online,
        }
    }

    #[tokio::test]
    async fn deliver_to_room_skips_every_origin_connection() {
        let f = fixture().await;
        let (a, mut rx_a) = connect(&f.registry, 1);
        let (a2, mut rx_a2) = connect(&f.registry, 1);
        let (b, mut rx_b) = connect(&f.registry, 2);
        for id in [a, a2, b] {
            f.registry.join_room(id, Room::Channel(7)).unwrap();
        }

        let event = Event::new(status(1), Scope::channel(7)).excluding(a, 1);
        assert_eq!(f.router.deliver(&event), 1);

        assert!(drain(&mut rx_a).is_empty());
        assert!(drain(&mut rx_a2).is_empty());
        let frames = drain(&mut rx_b);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["event"], "user_status_change");
    }

    #[tokio::test]
    async fn deliver_to_all_and_to_one_connection() {
        let f = fixture().await;
        let (a, mut rx_a) = connect(&f.registry, 1);
        let (_b, mut rx_b) = connect(&f.registry, 2);

        assert_eq!(f.router.deliver(&Event::new(status(1), Scope::All)), 2);
        assert_eq!(f.router.deliver(&Event::new(status(1), Scope::Connection(a))), 1);

        assert_eq!(drain(&mut rx_a).len(), 2);
        assert_eq!(drain(&mut rx_b).len(), 1);
    }

    #[tokio::test]
    async fn deliver_to_empty_room_reaches_nobody() {
        let f = fixture().await;
        let (_a, mut rx_a) = connect(&f.registry, 1);

        assert_eq!(f.router.deliver(&Event::new(status(1), Scope::channel(9))), 0);
        assert!(drain(&mut rx_a).is_empty());
    }

    #[tokio::test]
    async fn request_join_checks_membership() {
        let f = fixture().await;
        let ada = user(&f.store, "ada").await;
        let eve = user(&f.store, "eve").await;
        let channel = f
            .store
            .create_channel(
                ada,
                &NewChannel {
                    name: "general".to_owned(),
                    description: None,
                    is_private: false,
                },
            )
            .await
            .unwrap();
        let (a, mut rx_a) = connect(&f.registry, ada);
        let (e, mut rx_e) = connect(&f.registry, eve);

        f.router.request_join(a, channel.id).await.unwrap();
        assert!(matches!(
            f.router.request_join(e, channel.id).await,
            Err(ChatError::Permission(_))
        ));

        assert_eq!(f.registry.connections_in_room(Room::Channel(channel.id)), vec![a]);
        let frames = drain(&mut rx_a);
        assert_eq!(frames[0]["event"], "joined_channel");
        assert_eq!(frames[0]["data"]["channel_id"], channel.id);
        assert!(drain(&mut rx_e).is_empty());
    }

    #[tokio::test]
    async fn request_leave_always_confirms() {
        let f = fixture().await;
        let (a, mut rx_a) = connect(&f.registry, 1);
        f.registry.join_room(a, Room::Channel(7)).unwrap();

        f.router.request_leave(a, 7);
        f.router.request_leave(a, 7);

        assert!(f.registry.connections_in_room(Room::Channel(7)).is_empty());
        let frames = drain(&mut rx_a);
        assert_eq!(frames.len(), 2);
        assert!(frames.iter().all(|frame| frame["event"] == "left_channel"));
    }

    #[tokio::test]
    async fn auto_join_covers_every_device() {
        let f = fixture().await;
        let (a, _rx_a) = connect(&f.registry, 1);
        let (b, _rx_b) = connect(&f.registry, 1);
        let (_c, _rx_c) = connect(&f.registry, 2);

        assert_eq!(f.router.auto_join(1, 7), 2);
        assert_eq!(f.router.auto_join(1, 7), 0);

        let mut joined = f.registry.connections_in_room(Room::Channel(7));
        joined.sort();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(joined, expected);
    }
}
