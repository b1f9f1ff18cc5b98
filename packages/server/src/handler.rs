//! WebSocket session handling.
//!
//! One [`handle_session`] runs per accepted connection and walks the
//! session lifecycle: upgrade, name frame, event loop, teardown. Transport
//! errors are caught here and converted into a leave; nothing from a single
//! session is allowed to take down the server process.

use std::sync::Arc;

use axum::{
    Json,
    extract::{
        State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade, close_code},
    },
    response::IntoResponse,
};
use futures_util::{sink::SinkExt, stream::StreamExt};
use tokio::sync::mpsc;
use uuid::Uuid;

use idobata_shared::{
    protocol::{ClientEvent, sanitize_name},
    room::RoomState,
};

use crate::state::AppState;

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_session(socket, state))
}

/// Drive one session from name frame to teardown.
async fn handle_session(socket: WebSocket, state: Arc<AppState>) {
    let session_id = Uuid::new_v4();
    let (mut sender, mut receiver) = socket.split();

    // The first inbound frame is the raw user name, no protocol wrapper.
    let name = match receiver.next().await {
        Some(Ok(Message::Text(text))) => sanitize_name(&text),
        other => {
            tracing::warn!("Session {} ended before sending a name: {:?}", session_id, other);
            return;
        }
    };
    if name.is_empty() {
        tracing::warn!("Session {} sent an empty name, closing", session_id);
        let _ = sender
            .send(Message::Close(Some(CloseFrame {
                code: close_code::POLICY,
                reason: "empty name".into(),
            })))
            .await;
        return;
    }

    // Register the snapshot channel and join under one lock, so the join
    // broadcast reaches this session as well.
    let (tx, mut rx) = mpsc::unbounded_channel();
    {
        let mut room = state.room.lock().await;
        room.register(session_id, tx);
        if let Err(e) = room.join(&name) {
            tracing::warn!("Rejecting session {}: {}", session_id, e);
            room.unregister(session_id);
            drop(room);
            let _ = sender
                .send(Message::Close(Some(CloseFrame {
                    code: close_code::POLICY,
                    reason: "name already taken".into(),
                })))
                .await;
            return;
        }
    }
    tracing::info!("'{}' joined as session {}", name, session_id);

    // Receive loop: decode inbound frames and submit them to the room.
    // Rejected frames are dropped without a broadcast, so the sending
    // client gets no visible feedback for them.
    let recv_state = state.clone();
    let recv_name = name.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(frame) = receiver.next().await {
            match frame {
                Ok(Message::Text(text)) => match ClientEvent::decode(&text) {
                    Ok(event) => {
                        let mut room = recv_state.room.lock().await;
                        if let Err(e) = room.apply(event) {
                            tracing::warn!("Dropping event from '{}': {}", recv_name, e);
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Dropping malformed frame from '{}': {}", recv_name, e);
                    }
                },
                Ok(Message::Close(_)) => {
                    tracing::info!("'{}' requested close", recv_name);
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("Lost connection to '{}': {}", recv_name, e);
                    break;
                }
            }
        }
    });

    // Forwarding task: snapshots pushed by the room go out on the socket.
    // A failed send marks this session for teardown via the select below.
    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sender.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    // If either side ends, abort the other.
    tokio::select! {
        _ = &mut recv_task => send_task.abort(),
        _ = &mut send_task => recv_task.abort(),
    }

    // Teardown: deregister and announce the disconnect atomically.
    {
        let mut room = state.room.lock().await;
        room.unregister(session_id);
        room.leave(&name);
    }
    tracing::info!("'{}' left, session {} closed", name, session_id);
}

/// Debug endpoint returning the current room snapshot (for testing purposes)
pub async fn debug_room_state(State(state): State<Arc<AppState>>) -> Json<RoomState> {
    let room = state.room.lock().await;
    Json(room.snapshot())
}

/// Health check endpoint
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}
