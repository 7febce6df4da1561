use std::sync::Arc;

use axum::{
    debug_handler,
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    auth::AuthUser,
    db::{Destination, MessageId, Reaction, UserId},
    error::{ChatError, ChatResult},
    realtime::{Event, EventPayload, Hub, Scope},
    AppResult, AppState,
};

/// Adds one reaction per (message, user, reaction). A repeat is a conflict
/// and is not fanned out again.
pub async fn add_reaction(
    hub: &Hub,
    user_id: UserId,
    message_id: MessageId,
    reaction: &str,
) -> ChatResult<Reaction> {
    let reaction = reaction.trim();
    if reaction.is_empty() {
        return Err(ChatError::validation("reaction cannot be empty"));
    }

    let store = hub.store();
    let message = store
        .get_message(message_id)
        .await?
        .ok_or(ChatError::NotFound("message"))?;
    let destination = message.destination().ok_or(ChatError::NotFound("message"))?;

    let allowed = match destination {
        Destination::Channel(channel_id) => hub.membership().is_channel_member(channel_id, user_id).await?,
        Destination::Direct(chat_id) => hub.membership().is_chat_participant(chat_id, user_id).await?,
    };
    if !allowed {
        return Err(ChatError::permission("access denied"));
    }

    if store.find_reaction(message_id, user_id, reaction).await?.is_some() {
        return Err(ChatError::conflict("reaction already exists"));
    }
    let reaction = store.insert_reaction(message_id, user_id, reaction).await?;
    tracing::debug!(reaction_id = reaction.id, message_id, user_id, "stored reaction");

    let payload = EventPayload::NewReaction {
        reaction: reaction.clone(),
    };
    match destination {
        Destination::Channel(channel_id) => {
            hub.notify(Event::new(payload, Scope::channel(channel_id)));
        }
        Destination::Direct(chat_id) => {
            for participant in hub.membership().chat_participants(chat_id).await? {
                hub.notify(Event::new(payload.clone(), Scope::user(participant)));
            }
        }
    }

    Ok(reaction)
}

#[derive(Deserialize)]
pub(crate) struct ReactRequest {
    #[serde(default)]
    reaction: String,
}

#[debug_handler(state = AppState)]
pub(crate) async fn react(
    State(hub): State<Arc<Hub>>,
    AuthUser(user_id): AuthUser,
    Path(message_id): Path<MessageId>,

    Json(ReactRequest { reaction }): Json<ReactRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let reaction = add_reaction(&hub, user_id, message_id, &reaction).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "reaction": reaction })),
    ))
}
