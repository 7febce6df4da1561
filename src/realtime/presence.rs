//! Online/offline bookkeeping and typing indicators.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::{
    db::{ChannelId, ChatId, Store, UserId, UserStatus},
    error::{ChatError, ChatResult},
};

use super::{
    ConnectionId, ConnectionRegistry, Event, EventPayload, EventRouter, MembershipIndex, Scope, Typing,
};

/// Last status written for a user, `None` until first read from the store.
type StatusCell = Arc<Mutex<Option<UserStatus>>>;

pub struct PresenceCoordinator {
    store: Store,
    registry: Arc<ConnectionRegistry>,
    membership: Arc<MembershipIndex>,
    router: Arc<EventRouter>,
    statuses: DashMap<UserId, StatusCell>,
}

impl PresenceCoordinator {
    pub fn new(
        store: Store,
        registry: Arc<ConnectionRegistry>,
        membership: Arc<MembershipIndex>,
        router: Arc<EventRouter>,
    ) -> Self {
        Self {
            store,
            registry,
            membership,
            router,
            statuses: DashMap::new(),
        }
    }

    fn cell(&self, user_id: UserId) -> StatusCell {
        self.statuses.entry(user_id).or_default().clone()
    }

    /// Brings the durable status in line with whether the user currently has
    /// a live connection. Away and busy survive further connects. Writes and
    /// broadcasts only on an actual change; returns the new status then.
    pub async fn reconcile(&self, user_id: UserId) -> ChatResult<Option<UserStatus>> {
        let cell = self.cell(user_id);
        let mut current = cell.lock().await;

        if current.is_none() {
            *current = self.store.get_user(user_id).await?.map(|user| user.status);
        }

        let desired = if self.registry.is_online(user_id) {
            match *current {
                Some(kept @ (UserStatus::Away | UserStatus::Busy)) => kept,
                _ => UserStatus::Online,
            }
        } else {
            UserStatus::Offline
        };

        let changed = *current != Some(desired);
        if changed {
            self.store.set_user_status(user_id, desired).await?;
            *current = Some(desired);
            self.broadcast(user_id, desired);
            tracing::info!(user_id, status = ?desired, "presence changed");
        }

        if desired == UserStatus::Offline {
            self.forget(user_id, &cell);
        }
        Ok(changed.then_some(desired))
    }

    /// Drops the cell of a user who is offline and disconnected, unless
    /// another task is already waiting on it. The store still has the status.
    fn forget(&self, user_id: UserId, cell: &StatusCell) {
        // one reference in the map, one held by the caller
        self.statuses.remove_if(&user_id, |_, held| {
            Arc::ptr_eq(held, cell) && Arc::strong_count(held) == 2 && !self.registry.is_online(user_id)
        });
    }

    /// Records a status the user picked themselves.
    pub async fn record_explicit(&self, user_id: UserId, status: UserStatus) -> ChatResult<()> {
        let cell = self.cell(user_id);
        let mut current = cell.lock().await;

        if !self.store.set_user_status(user_id, status).await? {
            return Err(ChatError::UnknownUser(user_id));
        }
        *current = Some(status);
        self.broadcast(user_id, status);
        if status == UserStatus::Offline {
            self.forget(user_id, &cell);
        }
        Ok(())
    }

    fn broadcast(&self, user_id: UserId, status: UserStatus) {
        self.router.deliver(&Event::new(
            EventPayload::UserStatusChange { user_id, status },
            Scope::All,
        ));
    }

    /// Forwards a typing indicator to the rest of the channel, skipping the
    /// typist's own connections. Returns how many connections received it.
    pub async fn typing_channel(
        &self,
        connection_id: ConnectionId,
        channel_id: ChannelId,
        typing: bool,
    ) -> ChatResult<usize> {
        let Some(user_id) = self.registry.user_of(connection_id) else {
            return Ok(0);
        };
        if !self.membership.is_channel_member(channel_id, user_id).await? {
            return Err(ChatError::permission("not a member of this channel"));
        }

        let payload = typing_payload(Typing::channel(channel_id, user_id), typing);
        let event = Event::new(payload, Scope::channel(channel_id)).excluding(connection_id, user_id);
        Ok(self.router.deliver(&event))
    }

    /// Forwards a typing indicator to the other participants of a direct
    /// chat.
    pub async fn typing_direct(
        &self,
        connection_id: ConnectionId,
        chat_id: ChatId,
        typing: bool,
    ) -> ChatResult<usize> {
        let Some(user_id) = self.registry.user_of(connection_id) else {
            return Ok(0);
        };
        let participants = self.membership.chat_participants(chat_id).await?;
        if !participants.contains(&user_id) {
            return Err(ChatError::permission("not a participant of this chat"));
        }

        let payload = typing_payload(Typing::direct(chat_id, user_id), typing);
        let delivered: usize = participants
            .into_iter()
            .filter(|participant| *participant != user_id)
            .map(|participant| {
                let event = Event::new(payload.clone(), Scope::user(participant)).excluding(connection_id, user_id);
                self.router.deliver(&event)
            })
            .sum();
        Ok(delivered)
    }
}

fn typing_payload(typing: Typing, started: bool) -> EventPayload {
    if started {
        EventPayload::UserTyping(typing)
    } else {
        EventPayload::UserStoppedTyping(typing)
    }
}
