use serde::Serialize;

use crate::db::{
    Channel, ChannelId, ChatId, DirectChat, MessageView, Reaction, UserId, UserStatus,
};

use super::{ConnectionId, Scope};

/// Everything the server pushes to clients. Serializes as
/// `{"event": "<kind>", "data": {...}}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum EventPayload {
    ChannelCreated {
        channel: Channel,
        creator_id: UserId,
    },
    ChannelMemberAdded {
        channel_id: ChannelId,
        user_id: UserId,
        added_by_id: UserId,
    },
    ChannelAdded {
        channel: Channel,
    },
    DirectMessageCreated {
        direct_message: DirectChat,
        participants: Vec<UserId>,
    },
    NewMessage {
        message: MessageView,
    },
    NewDirectMessage {
        message: MessageView,
    },
    NewReaction {
        reaction: Reaction,
    },
    UserTyping(Typing),
    UserStoppedTyping(Typing),
    UserStatusChange {
        user_id: UserId,
        status: UserStatus,
    },
    JoinedChannel {
        channel_id: ChannelId,
    },
    LeftChannel {
        channel_id: ChannelId,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum TypingTarget {
    Channel { channel_id: ChannelId },
    Direct { chat_id: ChatId, is_direct: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Typing {
    #[serde(flatten)]
    pub target: TypingTarget,
    pub user_id: UserId,
}

impl Typing {
    pub fn channel(channel_id: ChannelId, user_id: UserId) -> Self {
        Self {
            target: TypingTarget::Channel { channel_id },
            user_id,
        }
    }

    pub fn direct(chat_id: ChatId, user_id: UserId) -> Self {
        Self {
            target: TypingTarget::Direct {
                chat_id,
                is_direct: true,
            },
            user_id,
        }
    }
}

impl EventPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            EventPayload::ChannelCreated { .. } => "channel_created",
            EventPayload::ChannelMemberAdded { .. } => "channel_member_added",
            EventPayload::ChannelAdded { .. } => "channel_added",
            EventPayload::DirectMessageCreated { .. } => "direct_message_created",
            EventPayload::NewMessage { .. } => "new_message",
            EventPayload::NewDirectMessage { .. } => "new_direct_message",
            EventPayload::NewReaction { .. } => "new_reaction",
            EventPayload::UserTyping(_) => "user_typing",
            EventPayload::UserStoppedTyping(_) => "user_stopped_typing",
            EventPayload::UserStatusChange { .. } => "user_status_change",
            EventPayload::JoinedChannel { .. } => "joined_channel",
            EventPayload::LeftChannel { .. } => "left_channel",
        }
    }
}

/// Where an event came from. Every connection of the originating user is
/// skipped, not just the one that sent it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Origin {
    pub connection_id: ConnectionId,
    pub user_id: UserId,
}

/// A payload on its way to a scope.
#[derive(Debug, Clone)]
pub struct Event {
    pub payload: EventPayload,
    pub scope: Scope,
    pub exclude_origin: Option<Origin>,
}

impl Event {
    pub fn new(payload: EventPayload, scope: Scope) -> Self {
        Self {
            payload,
            scope,
            exclude_origin: None,
        }
    }

    pub fn excluding(mut self, connection_id: ConnectionId, user_id: UserId) -> Self {
        self.exclude_origin = Some(Origin {
            connection_id,
            user_id,
        });
        self
    }

    pub fn kind(&self) -> &'static str {
        self.payload.kind()
    }
}
