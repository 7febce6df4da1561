mod profile;

use axum::{
    routing::{get, put},
    Router,
};

use crate::AppState;

pub use profile::update_status;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(profile::search))
        .route("/me", get(profile::me).put(profile::update_me))
        .route("/status", put(profile::status))
        .route("/{id}", get(profile::user))
}
