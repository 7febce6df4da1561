use std::{collections::BTreeSet, sync::Arc};

use axum::{debug_handler, extract::State, http::StatusCode, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    auth::AuthUser,
    db::{DirectChatDetail, DirectChatSummary, UserId},
    error::{ChatError, ChatResult},
    realtime::{Event, EventPayload, Hub, Membership, Scope},
    AppResult, AppState,
};

/// Opens a direct chat between `user_id` and exactly one other user and tells
/// both of them about it.
pub async fn create_direct_chat(
    hub: &Hub,
    user_id: UserId,
    others: impl IntoIterator<Item = UserId>,
) -> ChatResult<DirectChatDetail> {
    let others: BTreeSet<UserId> = others.into_iter().filter(|id| *id != user_id).collect();
    let mut others = others.into_iter();
    let recipient_id = match (others.next(), others.next()) {
        (Some(id), None) => id,
        (None, _) => return Err(ChatError::validation("cannot create direct message with yourself")),
        (Some(_), Some(_)) => {
            return Err(ChatError::Unsupported("group direct messages are not supported".to_owned()));
        }
    };

    let store = hub.store();
    for id in [user_id, recipient_id] {
        if store.get_user(id).await?.is_none() {
            return Err(ChatError::NotFound("user"));
        }
    }

    let chat = store.create_direct_chat(user_id, recipient_id).await?;
    tracing::info!(chat_id = chat.id, user_id, recipient_id, "created direct chat");

    let participants = vec![user_id, recipient_id];
    for participant in &participants {
        hub.on_membership_created(Membership::Chat(chat.id), *participant).await;
    }
    for participant in &participants {
        hub.notify(Event::new(
            EventPayload::DirectMessageCreated {
                direct_message: chat.clone(),
                participants: participants.clone(),
            },
            Scope::user(*participant),
        ));
    }

    let participants = store.chat_participants(chat.id).await?;
    Ok(DirectChatDetail { chat, participants })
}

/// Every direct chat of the user, each with the profiles of the other side.
pub async fn direct_chats_for_user(hub: &Hub, user_id: UserId) -> ChatResult<Vec<DirectChatSummary>> {
    let store = hub.store();
    let mut summaries = Vec::new();

    for chat in store.chats_for_user(user_id).await? {
        let mut other_participants = Vec::new();
        for participant in store.chat_participant_ids(chat.id).await? {
            if participant == user_id {
                continue;
            }
            if let Some(user) = store.get_user(participant).await? {
                other_participants.push(user.profile());
            }
        }
        summaries.push(DirectChatSummary {
            chat,
            other_participants,
        });
    }

    Ok(summaries)
}

#[derive(Deserialize)]
pub(crate) struct NewDirectChat {
    recipient_id: Option<UserId>,
    #[serde(default)]
    participant_ids: Vec<UserId>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn new_direct_chat(
    State(hub): State<Arc<Hub>>,
    AuthUser(user_id): AuthUser,
    Json(NewDirectChat {
        recipient_id,
        participant_ids,
    }): Json<NewDirectChat>,
) -> AppResult<(StatusCode, Json<Value>)> {
    if recipient_id.is_none() && participant_ids.is_empty() {
        return Err(ChatError::validation("recipient id is required"))?;
    }

    let others = recipient_id.into_iter().chain(participant_ids);
    let detail = create_direct_chat(&hub, user_id, others).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "direct_message": detail })),
    ))
}

#[debug_handler(state = AppState)]
pub(crate) async fn list_direct_chats(
    State(hub): State<Arc<Hub>>,
    AuthUser(user_id): AuthUser,
) -> AppResult<Json<Value>> {
    let chats = direct_chats_for_user(&hub, user_id).await?;
    Ok(Json(json!({ "success": true, "direct_messages": chats })))
}
