//! Read-through view of who belongs to which channel and direct chat.

use std::collections::HashSet;

use dashmap::DashMap;

use crate::{
    db::{ChannelId, ChatId, Store, UserId},
    error::ChatResult,
};

/// A freshly committed membership fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    Channel(ChannelId),
    Chat(ChatId),
}

/// Caches membership facts loaded from the store. Facts are only ever
/// added, so a cached set is extended in place on refresh; a set loaded
/// concurrently with a refresh never overwrites the refreshed one.
pub struct MembershipIndex {
    store: Store,
    channel_members: DashMap<ChannelId, HashSet<UserId>>,
    chat_participants: DashMap<ChatId, HashSet<UserId>>,
    user_channels: DashMap<UserId, HashSet<ChannelId>>,
}

impl MembershipIndex {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            channel_members: DashMap::new(),
            chat_participants: DashMap::new(),
            user_channels: DashMap::new(),
        }
    }

    /// False for channels that do not exist.
    pub async fn is_channel_member(&self, channel_id: ChannelId, user_id: UserId) -> ChatResult<bool> {
        if let Some(members) = self.channel_members.get(&channel_id) {
            return Ok(members.contains(&user_id));
        }
        Ok(self.load_channel(channel_id).await?.contains(&user_id))
    }

    /// False for chats that do not exist.
    pub async fn is_chat_participant(&self, chat_id: ChatId, user_id: UserId) -> ChatResult<bool> {
        Ok(self.chat_participants(chat_id).await?.contains(&user_id))
    }

    pub async fn chat_participants(&self, chat_id: ChatId) -> ChatResult<HashSet<UserId>> {
        if let Some(participants) = self.chat_participants.get(&chat_id) {
            return Ok(participants.clone());
        }
        let loaded: HashSet<UserId> = self.store.chat_participant_ids(chat_id).await?.into_iter().collect();
        Ok(self
            .chat_participants
            .entry(chat_id)
            .or_insert(loaded)
            .clone())
    }

    pub async fn channels_for_user(&self, user_id: UserId) -> ChatResult<HashSet<ChannelId>> {
        if let Some(channels) = self.user_channels.get(&user_id) {
            return Ok(channels.clone());
        }
        let loaded: HashSet<ChannelId> = self.store.channel_ids_for_user(user_id).await?.into_iter().collect();
        Ok(self
            .user_channels
            .entry(user_id)
            .or_insert(loaded)
            .clone())
    }

    /// Records a membership fact that was just committed. Must run before
    /// any auto-join or fanout that relies on it.
    pub async fn refresh_on_membership_change(&self, membership: Membership, user_id: UserId) -> ChatResult<()> {
        match membership {
            Membership::Channel(channel_id) => {
                if !extend(&self.channel_members, channel_id, user_id) {
                    let fresh = self.store.channel_member_ids(channel_id).await?;
                    merge(&self.channel_members, channel_id, fresh);
                }
                if !extend(&self.user_channels, user_id, channel_id) {
                    let fresh = self.store.channel_ids_for_user(user_id).await?;
                    merge(&self.user_channels, user_id, fresh);
                }
            }
            Membership::Chat(chat_id) => {
                if !extend(&self.chat_participants, chat_id, user_id) {
                    let fresh = self.store.chat_participant_ids(chat_id).await?;
                    merge(&self.chat_participants, chat_id, fresh);
                }
            }
        }
        tracing::debug!(?membership, user_id, "membership refreshed");
        Ok(())
    }

    async fn load_channel(&self, channel_id: ChannelId) -> ChatResult<HashSet<UserId>> {
        let loaded: HashSet<UserId> = self.store.channel_member_ids(channel_id).await?.into_iter().collect();
        Ok(self
            .channel_members
            .entry(channel_id)
            .or_insert(loaded)
            .clone())
    }
}

/// Adds to an already cached set. False when nothing is cached for `key`.
fn extend(map: &DashMap<i64, HashSet<i64>>, key: i64, value: i64) -> bool {
    match map.get_mut(&key) {
        Some(mut set) => {
            set.insert(value);
            true
        }
        None => false,
    }
}

fn merge(map: &DashMap<i64, HashSet<i64>>, key: i64, fresh: Vec<i64>) {
    map.entry(key).or_default().extend(fresh);
}
