// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket fan-out: `/api/ws/{channel}` where channel is `owner` or a
//! session id. Server-to-client JSON only; client messages are ignored.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;

use crate::state::GateState;

/// `GET /api/ws/{channel}` — WebSocket upgrade for a live event stream.
pub async fn ws_handler(
    State(state): State<Arc<GateState>>,
    Path(channel): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(state, channel, socket))
}

/// Per-connection event loop. A lagged subscriber skips the dropped
/// events and keeps streaming — reliability comes from polling the
/// store, not from the socket.
async fn handle_connection(state: Arc<GateState>, channel: String, socket: WebSocket) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut rx = state.orchestrator.bus().subscribe(&channel).await;

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => break,
            event = rx.recv() => {
                let event = match event {
                    Ok(e) => e,
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                };
                if let Ok(json) = serde_json::to_string(&event) {
                    if ws_tx.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
            }
            msg = ws_rx.next() => {
                match msg {
                    // Client-to-server messages are ignored.
                    Some(Ok(Message::Close(_))) | None => break,
                    _ => {}
                }
            }
        }
    }
}
