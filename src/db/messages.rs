use time::OffsetDateTime;

use crate::error::{ChatError, ChatResult};

use super::{ChannelId, ChatId, Message, MessageId, Reaction, Store, UserId};

const MESSAGE_COLUMNS: &str =
    "id,content,sender_id,channel_id,direct_message_chat_id,created_at,updated_at,is_edited";

/// Where a message lives: exactly one of a channel or a direct chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Channel(ChannelId),
    Direct(ChatId),
}

impl Destination {
    fn column(self) -> &'static str {
        match self {
            Destination::Channel(_) => "channel_id",
            Destination::Direct(_) => "direct_message_chat_id",
        }
    }

    fn id(self) -> i64 {
        match self {
            Destination::Channel(id) | Destination::Direct(id) => id,
        }
    }

    /// Rows of `(user_id)` that should be notified about a new message.
    fn audience_sql(self) -> &'static str {
        match self {
            Destination::Channel(_) => {
                "SELECT user_id FROM channel_members WHERE channel_id=? AND user_id<>?"
            }
            Destination::Direct(_) => {
                "SELECT user_id FROM direct_message_participants WHERE chat_id=? AND user_id<>?"
            }
        }
    }
}

impl Message {
    pub fn destination(&self) -> Option<Destination> {
        match (self.channel_id, self.direct_message_chat_id) {
            (Some(channel_id), None) => Some(Destination::Channel(channel_id)),
            (None, Some(chat_id)) => Some(Destination::Direct(chat_id)),
            _ => None,
        }
    }
}

impl Store {
    /// Inserts the message plus an unread notification for everyone else in
    /// the destination, in one transaction.
    pub async fn insert_message(
        &self,
        sender_id: UserId,
        destination: Destination,
        content: &str,
    ) -> ChatResult<Message> {
        let created_at = OffsetDateTime::now_utc();
        let (channel_id, chat_id) = match destination {
            Destination::Channel(id) => (Some(id), None),
            Destination::Direct(id) => (None, Some(id)),
        };

        let mut tx = self.pool.begin().await?;

        let id = sqlx::query(
            "INSERT INTO messages (content,sender_id,channel_id,direct_message_chat_id,created_at,is_edited) VALUES (?,?,?,?,?,0)",
        )
        .bind(content)
        .bind(sender_id)
        .bind(channel_id)
        .bind(chat_id)
        .bind(created_at)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        sqlx::query(&format!(
            "INSERT INTO notifications (user_id,message_id,is_read,created_at) SELECT user_id,?,0,? FROM ({})",
            destination.audience_sql()
        ))
        .bind(id)
        .bind(created_at)
        .bind(destination.id())
        .bind(sender_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Message {
            id,
            content: content.to_owned(),
            sender_id: Some(sender_id),
            channel_id,
            direct_message_chat_id: chat_id,
            created_at,
            updated_at: None,
            is_edited: false,
        })
    }

    pub async fn get_message(&self, id: MessageId) -> ChatResult<Option<Message>> {
        Ok(
            sqlx::query_as(&format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id=?"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    /// One page of history, newest first, plus the total message count.
    /// Pages past the end come back empty.
    pub async fn message_history(
        &self,
        destination: Destination,
        page: i64,
        per_page: i64,
    ) -> ChatResult<(Vec<Message>, i64)> {
        let column = destination.column();

        let (total,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM messages WHERE {column}=?"))
            .bind(destination.id())
            .fetch_one(&self.pool)
            .await?;

        let offset = page.max(1).saturating_sub(1).saturating_mul(per_page.max(1));
        let messages = sqlx::query_as(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE {column}=? ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?"
        ))
        .bind(destination.id())
        .bind(per_page)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok((messages, total))
    }

    /// Marks every unread notification of `user_id` in the destination as read.
    pub async fn mark_read(&self, user_id: UserId, destination: Destination) -> ChatResult<u64> {
        let result = sqlx::query(&format!(
            "UPDATE notifications SET is_read=1
             WHERE user_id=? AND is_read=0
               AND message_id IN (SELECT id FROM messages WHERE {}=?)",
            destination.column()
        ))
        .bind(user_id)
        .bind(destination.id())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn reactions_for_message(&self, message_id: MessageId) -> ChatResult<Vec<Reaction>> {
        Ok(sqlx::query_as(
            "SELECT id,message_id,user_id,reaction,created_at FROM message_reactions WHERE message_id=? ORDER BY id",
        )
        .bind(message_id)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn find_reaction(
        &self,
        message_id: MessageId,
        user_id: UserId,
        reaction: &str,
    ) -> ChatResult<Option<Reaction>> {
        Ok(sqlx::query_as(
            "SELECT id,message_id,user_id,reaction,created_at FROM message_reactions WHERE message_id=? AND user_id=? AND reaction=?",
        )
        .bind(message_id)
        .bind(user_id)
        .bind(reaction)
        .fetch_optional(&self.pool)
        .await?)
    }

    pub async fn insert_reaction(
        &self,
        message_id: MessageId,
        user_id: UserId,
        reaction: &str,
    ) -> ChatResult<Reaction> {
        let created_at = OffsetDateTime::now_utc();
        let id = sqlx::query(
            "INSERT INTO message_reactions (message_id,user_id,reaction,created_at) VALUES (?,?,?,?)",
        )
        .bind(message_id)
        .bind(user_id)
        .bind(reaction)
        .bind(created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| ChatError::from_insert(e, "reaction already exists"))?
        .last_insert_rowid();

        Ok(Reaction {
            id,
            message_id,
            user_id,
            reaction: reaction.to_owned(),
            created_at,
        })
    }
}
