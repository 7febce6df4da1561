use std::sync::Arc;

use axum::{
    debug_handler,
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    auth::AuthUser,
    db::{Store, User, UserId, UserStatus},
    error::{ChatError, ChatResult},
    realtime::Hub,
    AppResult, AppState,
};

/// Sets a status the user picked and broadcasts it. Away and busy stick
/// across further device connects.
pub async fn update_status(hub: &Hub, user_id: UserId, status: UserStatus) -> ChatResult<User> {
    hub.presence().record_explicit(user_id, status).await?;
    tracing::info!(user_id, ?status, "status set by user");
    hub.store().get_user(user_id).await?.ok_or(ChatError::NotFound("user"))
}

#[debug_handler(state = AppState)]
pub(crate) async fn me(
    State(store): State<Store>,
    AuthUser(user_id): AuthUser,
) -> AppResult<Json<Value>> {
    let user = store.get_user(user_id).await?.ok_or(ChatError::NotFound("user"))?;
    Ok(Json(json!({ "success": true, "user": user.own_profile() })))
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct UpdateProfile {
    display_name: Option<String>,
    avatar_url: Option<String>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn update_me(
    State(store): State<Store>,
    AuthUser(user_id): AuthUser,

    Json(update): Json<UpdateProfile>,
) -> AppResult<Json<Value>> {
    let user = store
        .update_profile(user_id, update.display_name.as_deref(), update.avatar_url.as_deref())
        .await?
        .ok_or(ChatError::NotFound("user"))?;

    Ok(Json(json!({
        "success": true,
        "message": "Profile updated successfully",
        "user": user.own_profile(),
    })))
}

#[derive(Deserialize)]
pub(crate) struct StatusRequest {
    #[serde(default)]
    status: String,
}

#[debug_handler(state = AppState)]
pub(crate) async fn status(
    State(hub): State<Arc<Hub>>,
    AuthUser(user_id): AuthUser,

    Json(StatusRequest { status }): Json<StatusRequest>,
) -> AppResult<Json<Value>> {
    let user = update_status(&hub, user_id, status.parse()?).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Status updated successfully",
        "user": user.profile(),
    })))
}

#[derive(Deserialize)]
pub(crate) struct SearchQuery {
    #[serde(default)]
    query: String,
}

#[debug_handler(state = AppState)]
pub(crate) async fn search(
    State(store): State<Store>,
    AuthUser(_): AuthUser,
    Query(SearchQuery { query }): Query<SearchQuery>,
) -> AppResult<Json<Value>> {
    let users: Vec<_> = store
        .search_users(&query)
        .await?
        .iter()
        .map(User::profile)
        .collect();
    Ok(Json(json!({ "success": true, "users": users })))
}

#[debug_handler(state = AppState)]
pub(crate) async fn user(
    State(store): State<Store>,
    AuthUser(_): AuthUser,
    Path(user_id): Path<UserId>,
) -> AppResult<Json<Value>> {
    let user = store.get_user(user_id).await?.ok_or(ChatError::NotFound("user"))?;
    Ok(Json(json!({ "success": true, "user": user.profile() })))
}
