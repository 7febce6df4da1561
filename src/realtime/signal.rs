use serde::Deserialize;

use crate::db::{ChannelId, ChatId};

/// Frames a client may send over its socket. Any of them may carry a token,
/// which then has to belong to the connection's own user.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientSignal {
    TypingChannel {
        channel_id: ChannelId,
        #[serde(default)]
        token: Option<String>,
    },
    StoppedTypingChannel {
        channel_id: ChannelId,
        #[serde(default)]
        token: Option<String>,
    },
    TypingDirect {
        chat_id: ChatId,
        #[serde(default)]
        token: Option<String>,
    },
    StoppedTypingDirect {
        chat_id: ChatId,
        #[serde(default)]
        token: Option<String>,
    },
    JoinChannel {
        channel_id: ChannelId,
        #[serde(default)]
        token: Option<String>,
    },
    LeaveChannel {
        channel_id: ChannelId,
        #[serde(default)]
        token: Option<String>,
    },
}

impl ClientSignal {
    pub fn token(&self) -> Option<&str> {
        match self {
            ClientSignal::TypingChannel { token, .. }
            | ClientSignal::StoppedTypingChannel { token, .. }
            | ClientSignal::TypingDirect { token, .. }
            | ClientSignal::StoppedTypingDirect { token, .. }
            | ClientSignal::JoinChannel { token, .. }
            | ClientSignal::LeaveChannel { token, .. } => token.as_deref(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ClientSignal::TypingChannel { .. } => "typing_channel",
            ClientSignal::StoppedTypingChannel { .. } => "stopped_typing_channel",
            ClientSignal::TypingDirect { .. } => "typing_direct",
            ClientSignal::StoppedTypingDirect { .. } => "stopped_typing_direct",
            ClientSignal::JoinChannel { .. } => "join_channel",
            ClientSignal::LeaveChannel { .. } => "leave_channel",
        }
    }
}
