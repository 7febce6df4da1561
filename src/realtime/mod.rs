//! The real-time gateway: live connections, rooms, fanout and presence.

mod event;
mod membership;
mod presence;
mod registry;
mod room;
mod router;
mod signal;
pub mod ws;

use std::{fmt, sync::Arc};

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{
    auth::TokenKeys,
    db::{Store, UserId},
    error::{ChatError, ChatResult},
};

pub use event::{Event, EventPayload, Origin, Typing, TypingTarget};
pub use membership::{Membership, MembershipIndex};
pub use presence::PresenceCoordinator;
pub use registry::{ConnectionRegistry, Departure, Outbox};
pub use room::{Room, Scope};
pub use router::EventRouter;
pub use signal::ClientSignal;

pub const DEFAULT_OUTBOX_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// An accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    pub connection_id: ConnectionId,
    pub user_id: UserId,
}

/// Owns the registry, membership index, router and presence coordinator and
/// is the single entry point for sockets and for actions that fan out.
pub struct Hub {
    store: Store,
    tokens: TokenKeys,
    registry: Arc<ConnectionRegistry>,
    membership: Arc<MembershipIndex>,
    router: Arc<EventRouter>,
    presence: PresenceCoordinator,
    outbox_capacity: usize,
}

impl Hub {
    pub fn new(store: Store, tokens: TokenKeys, outbox_capacity: usize) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let membership = Arc::new(MembershipIndex::new(store.clone()));
        let router = Arc::new(EventRouter::new(registry.clone(), membership.clone()));
        let presence = PresenceCoordinator::new(store.clone(), registry.clone(), membership.clone(), router.clone());

        Self {
            store,
            tokens,
            registry,
            membership,
            router,
            presence,
            outbox_capacity: outbox_capacity.max(1),
        }
    }

    /// A fresh bounded outbox and the receiving end a socket task drains.
    pub fn open_outbox(&self) -> (Outbox, mpsc::Receiver<Arc<str>>) {
        mpsc::channel(self.outbox_capacity)
    }

    /// Authenticates a new connection, joins it to its user room and every
    /// channel room of the user, and brings presence up to date.
    pub async fn on_connect(&self, credential: Option<&str>, outbox: Outbox) -> ChatResult<Session> {
        let user_id = self.tokens.verify_access(credential)?;
        if self.store.get_user(user_id).await?.is_none() {
            return Err(ChatError::UnknownUser(user_id));
        }

        let connection_id = ConnectionId::new();
        self.registry.register(connection_id, user_id, outbox);

        if let Err(err) = self.join_channel_rooms(connection_id, user_id).await {
            self.registry.unregister(connection_id);
            return Err(err);
        }
        if let Err(err) = self.presence.reconcile(user_id).await {
            self.registry.unregister(connection_id);
            return Err(err);
        }

        tracing::info!(connection = %connection_id, user_id, "client connected");
        Ok(Session {
            connection_id,
            user_id,
        })
    }

    async fn join_channel_rooms(&self, connection_id: ConnectionId, user_id: UserId) -> ChatResult<()> {
        for channel_id in self.membership.channels_for_user(user_id).await? {
            self.registry.join_room(connection_id, Room::Channel(channel_id))?;
        }
        Ok(())
    }

    pub async fn on_disconnect(&self, connection_id: ConnectionId) {
        let Some(departure) = self.registry.unregister(connection_id) else {
            return;
        };
        tracing::info!(connection = %connection_id, user_id = departure.user_id, "client disconnected");

        if departure.last {
            if let Err(err) = self.presence.reconcile(departure.user_id).await {
                tracing::warn!(user_id = departure.user_id, error = %err, "failed to record offline status");
            }
        }
    }

    /// Handles one client frame. Failures only get logged; the connection
    /// stays open and nobody else hears about it.
    pub async fn on_client_signal(&self, connection_id: ConnectionId, signal: ClientSignal) {
        let kind = signal.kind();
        if let Err(err) = self.handle_signal(connection_id, signal).await {
            tracing::debug!(connection = %connection_id, kind, error = %err, "dropped client signal");
        }
    }

    async fn handle_signal(&self, connection_id: ConnectionId, signal: ClientSignal) -> ChatResult<()> {
        if let Some(token) = signal.token() {
            let claimed = self.tokens.verify_access(Some(token))?;
            if self.registry.user_of(connection_id) != Some(claimed) {
                return Err(ChatError::Authentication);
            }
        }

        match signal {
            ClientSignal::TypingChannel { channel_id, .. } => {
                self.presence.typing_channel(connection_id, channel_id, true).await?;
            }
            ClientSignal::StoppedTypingChannel { channel_id, .. } => {
                self.presence.typing_channel(connection_id, channel_id, false).await?;
            }
            ClientSignal::TypingDirect { chat_id, .. } => {
                self.presence.typing_direct(connection_id, chat_id, true).await?;
            }
            ClientSignal::StoppedTypingDirect { chat_id, .. } => {
                self.presence.typing_direct(connection_id, chat_id, false).await?;
            }
            ClientSignal::JoinChannel { channel_id, .. } => {
                self.router.request_join(connection_id, channel_id).await?;
            }
            ClientSignal::LeaveChannel { channel_id, .. } => {
                self.router.request_leave(connection_id, channel_id);
            }
        }
        Ok(())
    }

    /// Makes a just-committed membership visible to fanout: the index learns
    /// about it and, for channels, the user's live connections join the room.
    pub async fn on_membership_created(&self, membership: Membership, user_id: UserId) {
        if let Err(err) = self.membership.refresh_on_membership_change(membership, user_id).await {
            // nothing cached for it then, so later reads go to the store
            tracing::warn!(?membership, user_id, error = %err, "failed to refresh membership");
        }
        if let Membership::Channel(channel_id) = membership {
            let joined = self.router.auto_join(user_id, channel_id);
            tracing::debug!(user_id, channel_id, joined, "auto-joined live connections");
        }
    }

    /// Delivers an event produced outside the gateway.
    pub fn notify(&self, event: Event) -> usize {
        self.router.deliver(&event)
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn tokens(&self) -> &TokenKeys {
        &self.tokens
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn membership(&self) -> &MembershipIndex {
        &self.membership
    }

    pub fn router(&self) -> &EventRouter {
        &self.router
    }

    pub fn presence(&self) -> &PresenceCoordinator {
        &self.presence
    }
}
