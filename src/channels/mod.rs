mod direct;
mod members;

use std::sync::Arc;

use axum::{
    debug_handler,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

use crate::{
    auth::AuthUser,
    db::{Channel, ChannelDetail, ChannelId, NewChannel, UserId},
    error::{ChatError, ChatResult},
    realtime::{Event, EventPayload, Hub, Membership, Scope},
    AppResult, AppState,
};

pub use direct::{create_direct_chat, direct_chats_for_user};
pub use members::add_channel_member;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_channels).post(new_channel))
        .route("/direct", get(direct::list_direct_chats).post(direct::new_direct_chat))
        .route("/{id}", get(channel))
        .route("/{id}/members", post(members::add_member))
}

/// Creates a channel with its creator as the first member and announces it
/// to every connection.
pub async fn create_channel(hub: &Hub, creator: UserId, mut new: NewChannel) -> ChatResult<Channel> {
    new.name = new.name.trim().to_owned();
    if new.name.is_empty() {
        return Err(ChatError::validation("channel name is required"));
    }

    let channel = hub.store().create_channel(creator, &new).await?;
    tracing::info!(channel_id = channel.id, creator, "created channel");

    hub.on_membership_created(Membership::Channel(channel.id), creator).await;
    hub.notify(Event::new(
        EventPayload::ChannelCreated {
            channel: channel.clone(),
            creator_id: creator,
        },
        Scope::All,
    ));
    Ok(channel)
}

/// A channel with its members. Private channels are only visible to members.
pub async fn channel_detail(hub: &Hub, user_id: UserId, channel_id: ChannelId) -> ChatResult<ChannelDetail> {
    let channel = hub
        .store()
        .get_channel(channel_id)
        .await?
        .ok_or(ChatError::NotFound("channel"))?;

    if channel.is_private && !hub.membership().is_channel_member(channel_id, user_id).await? {
        return Err(ChatError::permission("access denied"));
    }

    let members = hub.store().channel_members(channel_id).await?;
    Ok(ChannelDetail { channel, members })
}

#[debug_handler(state = AppState)]
async fn new_channel(
    State(hub): State<Arc<Hub>>,
    AuthUser(user_id): AuthUser,
    Json(new): Json<NewChannel>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let channel = create_channel(&hub, user_id, new).await?;
    let detail = channel_detail(&hub, user_id, channel.id).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "channel": detail })),
    ))
}

#[debug_handler(state = AppState)]
async fn list_channels(
    State(hub): State<Arc<Hub>>,
    AuthUser(user_id): AuthUser,
) -> AppResult<Json<Value>> {
    let channels = hub.store().channels_for_user(user_id).await?;
    Ok(Json(json!({ "success": true, "channels": channels })))
}

#[debug_handler(state = AppState)]
async fn channel(
    State(hub): State<Arc<Hub>>,
    AuthUser(user_id): AuthUser,
    Path(channel_id): Path<ChannelId>,
) -> AppResult<Json<Value>> {
    let detail = channel_detail(&hub, user_id, channel_id).await?;
    Ok(Json(json!({ "success": true, "channel": detail })))
}
