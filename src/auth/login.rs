use axum::{debug_handler, extract::State, http::HeaderMap, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{db::Store, error::ChatError, AppResult, AppState};

use super::{bearer, password::verify_password, TokenKeys, TokenType};

#[derive(Deserialize)]
pub(crate) struct LoginRequest {
    username: String,
    password: String,
}

#[debug_handler(state = AppState)]
pub(crate) async fn login(
    State(store): State<Store>,
    State(tokens): State<TokenKeys>,
    Json(LoginRequest { username, password }): Json<LoginRequest>,
) -> AppResult<Json<Value>> {
    if username.trim().is_empty() || password.is_empty() {
        return Err(ChatError::validation("username and password are required"))?;
    }

    let Some(user) = store.find_user_by_username(username.trim()).await? else {
        return Err(ChatError::Authentication)?;
    };

    let hash = user.password_hash.clone();
    if !tokio::task::spawn_blocking(move || verify_password(&password, &hash)).await?? {
        tracing::debug!(user_id = user.id, "wrong password");
        return Err(ChatError::Authentication)?;
    }

    let pair = tokens.issue_pair(user.id)?;
    tracing::info!(user_id = user.id, "logged in");

    Ok(Json(json!({
        "success": true,
        "user": user.own_profile(),
        "access_token": pair.access_token,
        "refresh_token": pair.refresh_token,
    })))
}

#[debug_handler(state = AppState)]
pub(crate) async fn refresh(
    State(store): State<Store>,
    State(tokens): State<TokenKeys>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user_id = tokens.verify(bearer(&headers), TokenType::Refresh)?;
    if store.get_user(user_id).await?.is_none() {
        return Err(ChatError::NotFound("user"))?;
    }

    Ok(Json(json!({
        "success": true,
        "access_token": tokens.issue(user_id, TokenType::Access)?,
    })))
}
