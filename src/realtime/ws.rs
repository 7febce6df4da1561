use std::sync::Arc;

use axum::{
    debug_handler,
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::HeaderMap,
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;

use crate::auth::bearer;

use super::{ClientSignal, Hub};

#[derive(Debug, Deserialize)]
pub struct GatewayParams {
    token: Option<String>,
}

/// `GET /ws?token=<access token>`. The bearer header works too.
#[debug_handler(state = crate::AppState)]
pub async fn gateway(
    Query(params): Query<GatewayParams>,
    State(hub): State<Arc<Hub>>,
    headers: HeaderMap,

    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let token = params.token.or_else(|| bearer(&headers).map(str::to_owned));
    ws.on_upgrade(move |socket| serve(hub, socket, token))
}

async fn serve(hub: Arc<Hub>, socket: WebSocket, token: Option<String>) {
    let (outbox, mut rx) = hub.open_outbox();
    let (mut sender, mut receiver) = socket.split();

    let session = match hub.on_connect(token.as_deref(), outbox).await {
        Ok(session) => session,
        Err(err) => {
            tracing::debug!(error = %err, "rejected websocket connection");
            let frame = CloseFrame {
                code: close_code::POLICY,
                reason: err.to_string().into(),
            };
            let _ = sender.send(Message::Close(Some(frame))).await;
            return;
        }
    };

    let mut forward_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sender.send(Message::Text(frame.to_string().into())).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            msg = receiver.next() => match msg {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientSignal>(text.as_str()) {
                    Ok(signal) => hub.on_client_signal(session.connection_id, signal).await,
                    Err(err) => tracing::debug!(connection = %session.connection_id, error = %err, "unreadable frame"),
                },
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            _ = &mut forward_task => break,
        }
    }

    hub.on_disconnect(session.connection_id).await;
    forward_task.abort();
}
