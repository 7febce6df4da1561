use axum::{debug_handler, Json};
use serde_json::{json, Value};

use crate::{AppResult, AppState};

use super::AuthUser;

/// Tokens are stateless, so there is nothing to revoke; clients drop them.
/// Presence is left to the gateway, which goes offline when the last socket
/// closes.
#[debug_handler(state = AppState)]
pub(crate) async fn logout(AuthUser(user_id): AuthUser) -> AppResult<Json<Value>> {
    tracing::info!(user_id, "logged out");
    Ok(Json(json!({ "success": true, "message": "User logged out successfully" })))
}
