use time::OffsetDateTime;

use crate::error::{ChatError, ChatResult};

use super::{ChatId, DirectChat, DirectParticipant, Store, UserId};

impl Store {
    /// Creates the chat between `user_id` and `other_id` with both as
    /// participants. A pair has at most one chat; when it already exists
    /// nothing is written and `DirectChatExists` names it.
    pub async fn create_direct_chat(&self, user_id: UserId, other_id: UserId) -> ChatResult<DirectChat> {
        let (low, high) = (user_id.min(other_id), user_id.max(other_id));
        let created_at = OffsetDateTime::now_utc();
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT INTO direct_message_chats (low_user_id,high_user_id,created_at) VALUES (?,?,?)
             ON CONFLICT (low_user_id,high_user_id) DO NOTHING",
        )
        .bind(low)
        .bind(high)
        .bind(created_at)
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            let chat_id = sqlx::query_scalar(
                "SELECT id FROM direct_message_chats WHERE low_user_id=? AND high_user_id=?",
            )
            .bind(low)
            .bind(high)
            .fetch_one(&mut *tx)
            .await?;
            return Err(ChatError::DirectChatExists { chat_id });
        }
        let id = inserted.last_insert_rowid();

        for participant in [user_id, other_id] {
            sqlx::query("INSERT INTO direct_message_participants (chat_id,user_id) VALUES (?,?)")
                .bind(id)
                .bind(participant)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(DirectChat { id, created_at })
    }

    pub async fn get_direct_chat(&self, id: ChatId) -> ChatResult<Option<DirectChat>> {
        Ok(sqlx::query_as("SELECT id,created_at FROM direct_message_chats WHERE id=?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn chat_exists(&self, id: ChatId) -> ChatResult<bool> {
        Ok(self.get_direct_chat(id).await?.is_some())
    }

    pub async fn chat_participant_ids(&self, id: ChatId) -> ChatResult<Vec<UserId>> {
        Ok(sqlx::query_scalar("SELECT user_id FROM direct_message_participants WHERE chat_id=?")
            .bind(id)
            .fetch_all(&self.pool)
            .await?)
    }

    pub async fn chat_participants(&self, id: ChatId) -> ChatResult<Vec<DirectParticipant>> {
        Ok(sqlx::query_as(
            "SELECT id,chat_id,user_id FROM direct_message_participants WHERE chat_id=? ORDER BY id",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn chats_for_user(&self, user_id: UserId) -> ChatResult<Vec<DirectChat>> {
        Ok(sqlx::query_as(
            "SELECT c.id,c.created_at FROM direct_message_chats c
             JOIN direct_message_participants p ON p.chat_id = c.id
             WHERE p.user_id=? ORDER BY c.id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }
}
