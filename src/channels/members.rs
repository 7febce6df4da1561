use std::sync::Arc;

use axum::{
    debug_handler,
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    auth::AuthUser,
    db::{ChannelId, ChannelMember, User, UserId},
    error::{ChatError, ChatResult},
    realtime::{Event, EventPayload, Hub, Membership, Scope},
    AppResult, AppState,
};

/// Adds `user_id` to the channel on behalf of an existing member. Before
/// returning, the new member's live connections are in the channel room, so
/// the next channel event reaches them.
pub async fn add_channel_member(
    hub: &Hub,
    added_by: UserId,
    channel_id: ChannelId,
    user_id: UserId,
) -> ChatResult<(ChannelMember, User)> {
    let store = hub.store();
    let channel = store
        .get_channel(channel_id)
        .await?
        .ok_or(ChatError::NotFound("channel"))?;
    let user = store.get_user(user_id).await?.ok_or(ChatError::NotFound("user"))?;

    if !hub.membership().is_channel_member(channel_id, added_by).await? {
        return Err(ChatError::permission("you must be a channel member to add users"));
    }

    let member = store.add_channel_member(channel_id, user_id).await?;
    tracing::info!(channel_id, user_id, added_by, "added channel member");

    hub.on_membership_created(Membership::Channel(channel_id), user_id).await;
    hub.notify(Event::new(
        EventPayload::ChannelMemberAdded {
            channel_id,
            user_id,
            added_by_id: added_by,
        },
        Scope::channel(channel_id),
    ));
    hub.notify(Event::new(EventPayload::ChannelAdded { channel }, Scope::user(user_id)));

    Ok((member, user))
}

#[derive(Deserialize)]
pub(crate) struct AddMemberRequest {
    user_id: Option<UserId>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn add_member(
    State(hub): State<Arc<Hub>>,
    AuthUser(added_by): AuthUser,
    Path(channel_id): Path<ChannelId>,

    Json(AddMemberRequest { user_id }): Json<AddMemberRequest>,
) -> AppResult<Json<Value>> {
    let Some(user_id) = user_id else {
        return Err(ChatError::validation("user id is required"))?;
    };

    let (_, user) = add_channel_member(&hub, added_by, channel_id, user_id).await?;
    Ok(Json(json!({
        "success": true,
        "message": format!("User {} added to channel successfully", user.username),
    })))
}
