use serde::Deserialize;
use time::OffsetDateTime;

use crate::error::{ChatError, ChatResult};

use super::{Channel, ChannelId, ChannelMember, Store, UserId};

#[derive(Debug, Clone, Deserialize)]
pub struct NewChannel {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub is_private: bool,
}

impl Store {
    /// Creates the channel and its creator's membership in one transaction.
    pub async fn create_channel(&self, creator: UserId, new: &NewChannel) -> ChatResult<Channel> {
        let now = OffsetDateTime::now_utc();
        let mut tx = self.pool.begin().await?;

        let id = sqlx::query(
            "INSERT INTO channels (name,description,is_private,created_by,created_at) VALUES (?,?,?,?,?)",
        )
        .bind(&new.name)
        .bind(&new.description)
        .bind(new.is_private)
        .bind(creator)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        sqlx::query("INSERT INTO channel_members (channel_id,user_id,joined_at) VALUES (?,?,?)")
            .bind(id)
            .bind(creator)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(Channel {
            id,
            name: new.name.clone(),
            description: new.description.clone(),
            is_private: new.is_private,
            created_by: Some(creator),
            created_at: now,
        })
    }

    pub async fn get_channel(&self, id: ChannelId) -> ChatResult<Option<Channel>> {
        Ok(sqlx::query_as(
            "SELECT id,name,description,is_private,created_by,created_at FROM channels WHERE id=?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?)
    }

    pub async fn channel_exists(&self, id: ChannelId) -> ChatResult<bool> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM channels WHERE id=?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    pub async fn channel_member_ids(&self, id: ChannelId) -> ChatResult<Vec<UserId>> {
        Ok(sqlx::query_scalar("SELECT user_id FROM channel_members WHERE channel_id=?")
            .bind(id)
            .fetch_all(&self.pool)
            .await?)
    }

    pub async fn channel_members(&self, id: ChannelId) -> ChatResult<Vec<ChannelMember>> {
        Ok(sqlx::query_as(
            "SELECT id,channel_id,user_id,joined_at FROM channel_members WHERE channel_id=? ORDER BY id",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn channel_ids_for_user(&self, user_id: UserId) -> ChatResult<Vec<ChannelId>> {
        Ok(sqlx::query_scalar("SELECT channel_id FROM channel_members WHERE user_id=?")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?)
    }

    pub async fn channels_for_user(&self, user_id: UserId) -> ChatResult<Vec<Channel>> {
        Ok(sqlx::query_as(
            "SELECT c.id,c.name,c.description,c.is_private,c.created_by,c.created_at
             FROM channels c JOIN channel_members m ON m.channel_id = c.id
             WHERE m.user_id=? ORDER BY c.id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn add_channel_member(
        &self,
        channel_id: ChannelId,
        user_id: UserId,
    ) -> ChatResult<ChannelMember> {
        let joined_at = OffsetDateTime::now_utc();
        let id = sqlx::query("INSERT INTO channel_members (channel_id,user_id,joined_at) VALUES (?,?,?)")
            .bind(channel_id)
            .bind(user_id)
            .bind(joined_at)
            .execute(&self.pool)
            .await
            .map_err(|e| ChatError::from_insert(e, "user is already a channel member"))?
            .last_insert_rowid();

        Ok(ChannelMember {
            id,
            channel_id,
            user_id,
            joined_at,
        })
    }
}
