mod history;
mod reactions;

use std::sync::Arc;

use axum::{
    debug_handler,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    auth::AuthUser,
    db::{ChannelId, ChatId, Destination, Message, MessageView, UserId},
    error::{ChatError, ChatResult},
    realtime::{Event, EventPayload, Hub, Scope},
    AppResult, AppState,
};

pub use history::{message_history, DEFAULT_PER_PAGE, MAX_PER_PAGE};
pub use reactions::add_reaction;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/channel/{id}", get(history::channel_history).post(send_to_channel))
        .route("/direct/{id}", get(history::direct_history).post(send_to_direct))
        .route("/{id}/reactions", post(reactions::react))
}

/// Stores a channel message and pushes it to the channel room.
pub async fn send_channel_message(
    hub: &Hub,
    sender_id: UserId,
    channel_id: ChannelId,
    content: &str,
) -> ChatResult<MessageView> {
    check_content(content)?;
    if !hub.store().channel_exists(channel_id).await? {
        return Err(ChatError::NotFound("channel"));
    }
    if !hub.membership().is_channel_member(channel_id, sender_id).await? {
        return Err(ChatError::permission("you must be a channel member to send messages"));
    }

    let message = hub
        .store()
        .insert_message(sender_id, Destination::Channel(channel_id), content)
        .await?;
    tracing::debug!(message_id = message.id, channel_id, sender_id, "stored channel message");

    let view = with_sender(hub, message).await?;
    hub.notify(Event::new(
        EventPayload::NewMessage { message: view.clone() },
        Scope::channel(channel_id),
    ));
    Ok(view)
}

/// Stores a direct message and pushes it to every participant's user room,
/// the sender's included.
pub async fn send_direct_message(
    hub: &Hub,
    sender_id: UserId,
    chat_id: ChatId,
    content: &str,
) -> ChatResult<MessageView> {
    check_content(content)?;
    if !hub.store().chat_exists(chat_id).await? {
        return Err(ChatError::NotFound("direct message chat"));
    }
    let participants = hub.membership().chat_participants(chat_id).await?;
    if !participants.contains(&sender_id) {
        return Err(ChatError::permission("you must be a participant to send messages"));
    }

    let message = hub
        .store()
        .insert_message(sender_id, Destination::Direct(chat_id), content)
        .await?;
    tracing::debug!(message_id = message.id, chat_id, sender_id, "stored direct message");

    let view = with_sender(hub, message).await?;
    for participant in participants {
        hub.notify(Event::new(
            EventPayload::NewDirectMessage { message: view.clone() },
            Scope::user(participant),
        ));
    }
    Ok(view)
}

fn check_content(content: &str) -> ChatResult<()> {
    if content.trim().is_empty() {
        return Err(ChatError::validation("message content cannot be empty"));
    }
    Ok(())
}

async fn with_sender(hub: &Hub, message: Message) -> ChatResult<MessageView> {
    let sender = match message.sender_id {
        Some(id) => hub.store().get_user(id).await?.map(|user| user.profile()),
        None => None,
    };
    Ok(MessageView {
        message,
        sender,
        reactions: None,
    })
}

#[derive(Deserialize)]
struct SendMessageRequest {
    #[serde(default)]
    content: String,
}

#[debug_handler(state = AppState)]
async fn send_to_channel(
    State(hub): State<Arc<Hub>>,
    AuthUser(user_id): AuthUser,
    Path(channel_id): Path<ChannelId>,

    Json(SendMessageRequest { content }): Json<SendMessageRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let message = send_channel_message(&hub, user_id, channel_id, &content).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "message": message })),
    ))
}

#[debug_handler(state = AppState)]
async fn send_to_direct(
    State(hub): State<Arc<Hub>>,
    AuthUser(user_id): AuthUser,
    Path(chat_id): Path<ChatId>,

    Json(SendMessageRequest { content }): Json<SendMessageRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let message = send_direct_message(&hub, user_id, chat_id, &content).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "message": message })),
    ))
}
