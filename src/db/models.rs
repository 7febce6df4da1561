use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::ChatError;

pub type UserId = i64;
pub type ChannelId = i64;
pub type ChatId = i64;
pub type MessageId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum UserStatus {
    Online,
    Away,
    Offline,
    Busy,
}

impl FromStr for UserStatus {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "online" => Ok(UserStatus::Online),
            "away" => Ok(UserStatus::Away),
            "offline" => Ok(UserStatus::Offline),
            "busy" => Ok(UserStatus::Busy),
            _ => Err(ChatError::validation("invalid status")),
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub status: UserStatus,
    pub created_at: OffsetDateTime,
    pub last_active: OffsetDateTime,
}

/// What other users get to see of a [`User`].
#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    pub id: UserId,
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub status: UserStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_active: OffsetDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl User {
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id,
            username: self.username.clone(),
            display_name: self.display_name.clone(),
            avatar_url: self.avatar_url.clone(),
            status: self.status,
            created_at: self.created_at,
            last_active: self.last_active,
            email: None,
        }
    }

    pub fn own_profile(&self) -> UserProfile {
        UserProfile {
            email: Some(self.email.clone()),
            ..self.profile()
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Channel {
    pub id: ChannelId,
    pub name: String,
    pub description: Option<String>,
    pub is_private: bool,
    pub created_by: Option<UserId>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ChannelMember {
    pub id: i64,
    pub channel_id: ChannelId,
    pub user_id: UserId,
    #[serde(with = "time::serde::rfc3339")]
    pub joined_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChannelDetail {
    #[serde(flatten)]
    pub channel: Channel,
    pub members: Vec<ChannelMember>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DirectChat {
    pub id: ChatId,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DirectParticipant {
    pub id: i64,
    pub chat_id: ChatId,
    pub user_id: UserId,
}

#[derive(Debug, Clone, Serialize)]
pub struct DirectChatDetail {
    #[serde(flatten)]
    pub chat: DirectChat,
    pub participants: Vec<DirectParticipant>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DirectChatSummary {
    #[serde(flatten)]
    pub chat: DirectChat,
    pub other_participants: Vec<UserProfile>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Message {
    pub id: MessageId,
    pub content: String,
    pub sender_id: Option<UserId>,
    pub channel_id: Option<ChannelId>,
    pub direct_message_chat_id: Option<ChatId>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<OffsetDateTime>,
    pub is_edited: bool,
}

/// A message as clients see it: with its sender, and with its reactions when
/// read back from history.
#[derive(Debug, Clone, Serialize)]
pub struct MessageView {
    #[serde(flatten)]
    pub message: Message,
    pub sender: Option<UserProfile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reactions: Option<Vec<Reaction>>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Reaction {
    pub id: i64,
    pub message_id: MessageId,
    pub user_id: UserId,
    pub reaction: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessagePage {
    pub messages: Vec<MessageView>,
    pub total: i64,
    pub pages: i64,
    pub current_page: i64,
}
