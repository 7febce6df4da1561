mod common;

use axum::{
    body::Body,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        Method, Request, StatusCode,
    },
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

async fn app() -> Router {
    huddle::router(common::state().await)
}

async fn call(app: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        request = request.header(AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => request
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => request.body(Body::empty()),
    }
    .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

/// Registers a user and returns `(user id, access token)`.
async fn register(app: &Router, name: &str) -> (i64, String) {
    let (status, body) = call(
        app,
        Method::POST,
        "/api/auth/register",
        None,
        Some(json!({
            "username": name,
            "email": format!("{name}@example.com"),
            "password": "correct horse",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    (
        body["user"]["id"].as_i64().unwrap(),
        body["access_token"].as_str().unwrap().to_owned(),
    )
}

#[tokio::test]
async fn health() {
    let app = app().await;
    let (status, body) = call(&app, Method::GET, "/api/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn register_login_and_refresh() {
    let app = app().await;
    let (ada, token) = register(&app, "ada").await;

    let (status, body) = call(&app, Method::GET, "/api/users/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["id"], ada);
    assert_eq!(body["user"]["email"], "ada@example.com");
    assert!(body["user"].get("password_hash").is_none());

    let (status, _) = call(
        &app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({ "username": "ada", "password": "wrong password" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({ "username": "ada", "password": "correct horse" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let refresh_token = body["refresh_token"].as_str().unwrap().to_owned();

    let (status, body) = call(&app, Method::POST, "/api/auth/refresh", Some(&refresh_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["access_token"].is_string());

    // an access token is not a refresh token
    let (status, _) = call(&app, Method::POST, "/api/auth/refresh", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = call(&app, Method::POST, "/api/auth/logout", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let (status, _) = call(&app, Method::POST, "/api/auth/logout", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn duplicate_registration_conflicts() {
    let app = app().await;
    register(&app, "ada").await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/auth/register",
        None,
        Some(json!({ "username": "ada", "email": "new@example.com", "password": "correct horse" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn requests_without_a_token_are_unauthorized() {
    let app = app().await;
    for uri in ["/api/users/me", "/api/channels", "/api/channels/direct"] {
        let (status, body) = call(&app, Method::GET, uri, None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
        assert_eq!(body["success"], false);
    }
}

#[tokio::test]
async fn channel_lifecycle() {
    let app = app().await;
    let (_, ada) = register(&app, "ada").await;
    let (bob_id, bob) = register(&app, "bob").await;

    let (status, _) = call(&app, Method::POST, "/api/channels", Some(&ada), Some(json!({ "name": "  " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/channels",
        Some(&ada),
        Some(json!({ "name": "secret", "is_private": true })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["channel"]["members"].as_array().unwrap().len(), 1);
    let channel_id = body["channel"]["id"].as_i64().unwrap();
    let uri = format!("/api/channels/{channel_id}");

    let (status, _) = call(&app, Method::GET, &uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = call(
        &app,
        Method::POST,
        &format!("{uri}/members"),
        Some(&ada),
        Some(json!({ "user_id": bob_id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(&app, Method::GET, &uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["channel"]["members"].as_array().unwrap().len(), 2);

    let (status, body) = call(&app, Method::GET, "/api/channels", Some(&bob), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["channels"][0]["id"], channel_id);

    let (status, _) = call(&app, Method::GET, "/api/channels/4040", Some(&bob), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn history_past_the_last_page_is_empty() {
    let app = app().await;
    let (_, ada) = register(&app, "ada").await;
    let (_, body) = call(&app, Method::POST, "/api/channels", Some(&ada), Some(json!({ "name": "general" }))).await;
    let uri = format!("/api/messages/channel/{}", body["channel"]["id"]);
    call(&app, Method::POST, &uri, Some(&ada), Some(json!({ "content": "only" }))).await;

    for page in [2, i64::MAX] {
        let (status, body) = call(&app, Method::GET, &format!("{uri}?page={page}"), Some(&ada), None).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["messages"], json!([]));
        assert_eq!(body["total"], 1);
        assert_eq!(body["pages"], 1);
        assert_eq!(body["current_page"], page);
    }

    let (status, body) = call(&app, Method::GET, &format!("{uri}?page=-5&per_page=1000"), Some(&ada), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["current_page"], 1);
    assert_eq!(body["messages"][0]["content"], "only");
}

#[tokio::test]
async fn messages_history_and_reactions() {
    let app = app().await;
    let (_, ada) = register(&app, "ada").await;
    let (bob_id, bob) = register(&app, "bob").await;

    let (_, body) = call(&app, Method::POST, "/api/channels", Some(&ada), Some(json!({ "name": "general" }))).await;
    let channel_id = body["channel"]["id"].as_i64().unwrap();
    let uri = format!("/api/messages/channel/{channel_id}");

    let (status, _) = call(&app, Method::POST, &uri, Some(&bob), Some(json!({ "content": "hi" }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    call(
        &app,
        Method::POST,
        &format!("/api/channels/{channel_id}/members"),
        Some(&ada),
        Some(json!({ "user_id": bob_id })),
    )
    .await;

    let (status, _) = call(&app, Method::POST, &uri, Some(&ada), Some(json!({ "content": "   " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    for content in ["first", "second", "third"] {
        let (status, _) = call(&app, Method::POST, &uri, Some(&ada), Some(json!({ "content": content }))).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, body) = call(&app, Method::GET, &format!("{uri}?per_page=2"), Some(&bob), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 3);
    assert_eq!(body["pages"], 2);
    assert_eq!(body["current_page"], 1);
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["content"], "third");
    assert_eq!(messages[0]["sender"]["username"], "ada");
    assert_eq!(messages[0]["reactions"], json!([]));

    let message_id = messages[0]["id"].as_i64().unwrap();
    let reactions = format!("/api/messages/{message_id}/reactions");
    let (status, body) = call(&app, Method::POST, &reactions, Some(&bob), Some(json!({ "reaction": "🎉" }))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["reaction"]["reaction"], "🎉");

    let (status, _) = call(&app, Method::POST, &reactions, Some(&bob), Some(json!({ "reaction": "🎉" }))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = call(&app, Method::POST, "/api/messages/999/reactions", Some(&bob), Some(json!({ "reaction": "🎉" }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn direct_chats() {
    let app = app().await;
    let (_, ada) = register(&app, "ada").await;
    let (bob_id, bob) = register(&app, "bob").await;
    let (_, eve) = register(&app, "eve").await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/channels/direct",
        Some(&ada),
        Some(json!({ "recipient_id": bob_id })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let chat_id = body["direct_message"]["id"].as_i64().unwrap();

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/channels/direct",
        Some(&ada),
        Some(json!({ "participant_ids": [bob_id] })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["direct_message_id"], chat_id);

    let (status, body) = call(&app, Method::GET, "/api/channels/direct", Some(&bob), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["direct_messages"][0]["other_participants"][0]["username"], "ada");

    let uri = format!("/api/messages/direct/{chat_id}");
    let (status, _) = call(&app, Method::POST, &uri, Some(&bob), Some(json!({ "content": "hey" }))).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = call(&app, Method::GET, &uri, Some(&eve), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = call(&app, Method::GET, &uri, Some(&ada), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["messages"][0]["content"], "hey");
}

#[tokio::test]
async fn status_updates() {
    let app = app().await;
    let (ada_id, ada) = register(&app, "ada").await;
    let (_, bob) = register(&app, "bob").await;

    let (status, _) = call(&app, Method::PUT, "/api/users/status", Some(&ada), Some(json!({ "status": "asleep" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = call(&app, Method::PUT, "/api/users/status", Some(&ada), Some(json!({ "status": "away" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["status"], "away");

    let (status, body) = call(&app, Method::GET, &format!("/api/users/{ada_id}"), Some(&bob), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["status"], "away");
    assert!(body["user"].get("email").is_none());

    let (status, body) = call(&app, Method::GET, "/api/users?query=ad", Some(&bob), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["users"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn profile_update_keeps_unset_fields() {
    let app = app().await;
    let (_, ada) = register(&app, "ada").await;

    let (status, body) = call(
        &app,
        Method::PUT,
        "/api/users/me",
        Some(&ada),
        Some(json!({ "avatar_url": "https://example.com/ada.png" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["display_name"], "ada");
    assert_eq!(body["user"]["avatar_url"], "https://example.com/ada.png");
}
