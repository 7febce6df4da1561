use std::{collections::HashMap, sync::Arc};

use axum::{
    debug_handler,
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    auth::AuthUser,
    db::{ChannelId, ChatId, Destination, MessagePage, MessageView, UserId, UserProfile},
    error::{ChatError, ChatResult},
    realtime::Hub,
    AppResult, AppState,
};

pub const DEFAULT_PER_PAGE: i64 = 50;
pub const MAX_PER_PAGE: i64 = 100;

/// One page of a channel's or chat's history, newest first, with senders and
/// reactions. Reading it marks the reader's notifications there as read.
pub async fn message_history(
    hub: &Hub,
    user_id: UserId,
    destination: Destination,
    page: i64,
    per_page: i64,
) -> ChatResult<MessagePage> {
    authorize_read(hub, user_id, destination).await?;

    let page = page.max(1);
    let per_page = per_page.clamp(1, MAX_PER_PAGE);
    let store = hub.store();
    let (messages, total) = store.message_history(destination, page, per_page).await?;

    let mut senders: HashMap<UserId, Option<UserProfile>> = HashMap::new();
    let mut views = Vec::with_capacity(messages.len());
    for message in messages {
        let sender = match message.sender_id {
            Some(id) => match senders.get(&id) {
                Some(profile) => profile.clone(),
                None => {
                    let profile = store.get_user(id).await?.map(|user| user.profile());
                    senders.insert(id, profile.clone());
                    profile
                }
            },
            None => None,
        };
        let reactions = store.reactions_for_message(message.id).await?;
        views.push(MessageView {
            message,
            sender,
            reactions: Some(reactions),
        });
    }

    let marked = store.mark_read(user_id, destination).await?;
    tracing::debug!(user_id, ?destination, marked, "marked notifications read");

    Ok(MessagePage {
        messages: views,
        total,
        pages: (total + per_page - 1) / per_page,
        current_page: page,
    })
}

/// Public channels are readable by anyone signed in; private channels and
/// direct chats only by their members.
async fn authorize_read(hub: &Hub, user_id: UserId, destination: Destination) -> ChatResult<()> {
    match destination {
        Destination::Channel(channel_id) => {
            let channel = hub
                .store()
                .get_channel(channel_id)
                .await?
                .ok_or(ChatError::NotFound("channel"))?;
            if channel.is_private && !hub.membership().is_channel_member(channel_id, user_id).await? {
                return Err(ChatError::permission("access denied"));
            }
        }
        Destination::Direct(chat_id) => {
            if !hub.store().chat_exists(chat_id).await? {
                return Err(ChatError::NotFound("direct message chat"));
            }
            if !hub.membership().is_chat_participant(chat_id, user_id).await? {
                return Err(ChatError::permission("access denied"));
            }
        }
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
pub(crate) struct PageQuery {
    page: Option<i64>,
    per_page: Option<i64>,
}

impl PageQuery {
    fn resolve(&self) -> (i64, i64) {
        (self.page.unwrap_or(1), self.per_page.unwrap_or(DEFAULT_PER_PAGE))
    }
}

fn page_body(page: MessagePage) -> Value {
    json!({
        "success": true,
        "messages": page.messages,
        "total": page.total,
        "pages": page.pages,
        "current_page": page.current_page,
    })
}

#[debug_handler(state = AppState)]
pub(crate) async fn channel_history(
    State(hub): State<Arc<Hub>>,
    AuthUser(user_id): AuthUser,
    Path(channel_id): Path<ChannelId>,
    Query(query): Query<PageQuery>,
) -> AppResult<Json<Value>> {
    let (page, per_page) = query.resolve();
    let history = message_history(&hub, user_id, Destination::Channel(channel_id), page, per_page).await?;
    Ok(Json(page_body(history)))
}

#[debug_handler(state = AppState)]
pub(crate) async fn direct_history(
    State(hub): State<Arc<Hub>>,
    AuthUser(user_id): AuthUser,
    Path(chat_id): Path<ChatId>,
    Query(query): Query<PageQuery>,
) -> AppResult<Json<Value>> {
    let (page, per_page) = query.resolve();
    let history = message_history(&hub, user_id, Destination::Direct(chat_id), page, per_page).await?;
    Ok(Json(page_body(history)))
}
