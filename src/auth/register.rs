use axum::{debug_handler, extract::State, http::StatusCode, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    db::{NewUser, Store, User},
    error::ChatError,
    AppResult, AppState,
};

use super::{password::hash_password, TokenKeys};

const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub display_name: Option<String>,
}

/// Validates the request and stores the new user with a hashed password.
pub async fn register_user(store: &Store, req: RegisterRequest) -> AppResult<User> {
    let username = req.username.trim();
    let email = req.email.trim();

    if username.is_empty() || email.is_empty() || req.password.is_empty() {
        return Err(ChatError::validation("all fields are required"))?;
    }
    if !looks_like_email(email) {
        return Err(ChatError::validation("invalid email format"))?;
    }
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ChatError::validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )))?;
    }
    if store.find_user_by_username(username).await?.is_some() {
        return Err(ChatError::conflict("username already exists"))?;
    }
    if store.email_taken(email).await? {
        return Err(ChatError::conflict("email already exists"))?;
    }

    let password = req.password;
    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password)).await??;

    let display_name = req.display_name.as_deref().map(str::trim).filter(|n| !n.is_empty());
    let user = store
        .create_user(NewUser {
            username,
            email,
            password_hash: &password_hash,
            display_name,
        })
        .await?;

    tracing::info!(user_id = user.id, username = %user.username, "registered user");
    Ok(user)
}

#[debug_handler(state = AppState)]
pub(crate) async fn register(
    State(store): State<Store>,
    State(tokens): State<TokenKeys>,
    Json(req): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let user = register_user(&store, req).await?;
    let pair = tokens.issue_pair(user.id)?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "user": user.own_profile(),
            "access_token": pair.access_token,
            "refresh_token": pair.refresh_token,
        })),
    ))
}

/// `local@domain.tld`, loosely.
fn looks_like_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && !tld.is_empty(),
        None => false,
    }
}
