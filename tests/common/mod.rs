#![allow(dead_code)]

use std::sync::Arc;

use huddle::{
    auth::{TokenKeys, TokenType},
    db::{NewUser, Store, UserId},
    realtime::Session,
    AppState,
};
use serde_json::Value;
use tokio::sync::mpsc;

pub async fn state() -> AppState {
    let store = Store::in_memory().await.unwrap();
    let tokens = TokenKeys::new("test-secret", time::Duration::hours(1), time::Duration::days(30));
    AppState::new(store, tokens, 64)
}

/// Inserts a user directly, skipping password hashing.
pub async fn user(state: &AppState, name: &str) -> UserId {
    state
        .store
        .create_user(NewUser {
            username: name,
            email: &format!("{name}@example.com"),
            password_hash: "unused",
            display_name: None,
        })
        .await
        .unwrap()
        .id
}

pub fn access_token(state: &AppState, user_id: UserId) -> String {
    state.tokens.issue(user_id, TokenType::Access).unwrap()
}

/// One live socket as the hub sees it, with its outbox readable.
pub struct Client {
    pub session: Session,
    rx: mpsc::Receiver<Arc<str>>,
}

impl Client {
    pub fn id(&self) -> huddle::realtime::ConnectionId {
        self.session.connection_id
    }

    /// Every frame queued so far.
    pub fn frames(&mut self) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.rx.try_recv() {
            frames.push(serde_json::from_str(&frame).unwrap());
        }
        frames
    }

    /// Queued frames of one kind; other kinds are discarded.
    pub fn events(&mut self, kind: &str) -> Vec<Value> {
        self.frames()
            .into_iter()
            .filter(|frame| frame["event"] == kind)
            .collect()
    }

    pub fn clear(&mut self) {
        self.frames();
    }
}

pub async fn connect(state: &AppState, user_id: UserId) -> Client {
    let token = access_token(state, user_id);
    let (outbox, rx) = state.hub.open_outbox();
    let session = state.hub.on_connect(Some(&token), outbox).await.unwrap();
    Client { session, rx }
}
