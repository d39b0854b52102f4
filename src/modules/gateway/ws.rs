use std::net::SocketAddr;

use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    http::{header, HeaderMap},
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::modules::chat::{ChatResponse, Outbox};
use super::AppState;

const OUTBOX_CAPACITY: usize = 256;

/// GET /chat, upgraded to the chat socket.
pub async fn chat_socket(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
) -> Response {
    let authorized = match &state.auth {
        Some(auth) => auth.verify_header(headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok())),
        None => true,
    };
    let peer = peer.map(|ConnectInfo(addr)| addr.to_string());

    ws.on_upgrade(move |socket| async move {
        if authorized {
            run_socket(socket, state, peer).await;
        } else {
            reject(socket, peer).await;
        }
    })
}

async fn reject(mut socket: WebSocket, peer: Option<String>) {
    warn!(peer = peer.as_deref().unwrap_or("?"), "🔒 Closing unauthenticated chat socket");
    let frame = CloseFrame { code: close_code::POLICY, reason: "Unauthorized".into() };
    let _ = socket.send(Message::Close(Some(frame))).await;
}

async fn run_socket(socket: WebSocket, state: AppState, peer: Option<String>) {
    let guard = state.sessions.register();
    let session_id = guard.id();
    info!(%session_id, peer = peer.as_deref().unwrap_or("?"), "🔌 Chat session opened");

    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<ChatResponse>(OUTBOX_CAPACITY);

    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let text = match serde_json::to_string(&frame) {
                Ok(t) => t,
                Err(e) => {
                    error!("Failed to encode chat frame: {}", e);
                    continue;
                }
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let mut session = state.engine.open_session(session_id, Outbox::new(tx));

    while let Some(incoming) = stream.next().await {
        match incoming {
            Ok(Message::Text(text)) => {
                let question = text.trim();
                if question.is_empty() {
                    continue;
                }
                if session.run_turn(question).await.is_err() {
                    break;
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                warn!(%session_id, "⚠️ Chat socket error: {}", e);
                break;
            }
        }
    }

    // Dropping the session closes the outbox so the writer drains and exits.
    drop(session);
    let _ = writer.await;
    info!(%session_id, "👋 Chat session closed");
}
