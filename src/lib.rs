pub mod appresult;
pub mod auth;
pub mod channels;
pub mod config;
pub mod db;
pub mod error;
pub mod messages;
pub mod realtime;
pub mod res;
pub mod users;

use std::sync::Arc;

use axum::{debug_handler, extract::FromRef, routing::get, Json, Router};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{auth::TokenKeys, config::Config, db::Store, realtime::Hub};

pub use appresult::{AppError, AppResult};

#[derive(Clone, FromRef)]
pub struct AppState {
    pub store: Store,
    pub tokens: TokenKeys,
    pub hub: Arc<Hub>,
}

impl AppState {
    pub fn new(store: Store, tokens: TokenKeys, outbox_capacity: usize) -> Self {
        let hub = Hub::new(store.clone(), tokens.clone(), outbox_capacity);
        Self {
            store,
            tokens,
            hub: Arc::new(hub),
        }
    }

    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let store = Store::connect(&config.database_url, config.db_max_connections).await?;
        let tokens = TokenKeys::new(
            &config.jwt_secret,
            config.access_token_ttl,
            config.refresh_token_ttl,
        );
        Ok(Self::new(store, tokens, config.outbox_capacity))
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .nest("/api/auth", auth::router())
        .nest("/api/channels", channels::router())
        .nest("/api/messages", messages::router())
        .nest("/api/users", users::router())
        .route("/ws", get(realtime::ws::gateway))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

#[debug_handler]
async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}
