// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Live ticket stream over WebSocket.
//!
//! Server -> Client (JSON):
//! ```json
//! {"type": "timeline", "entries": [{"id": "...", "body": "...", "pending": false}]}
//! {"type": "warning", "message": "sync may be incomplete"}
//! {"type": "error", "message": "..."}
//! ```
//!
//! Client -> Server (JSON):
//! ```json
//! {"body": "reply text"}
//! ```

use axum::{
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use deskline_core::TicketId;
use deskline_sync::{SyncHandle, SyncUpdate};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::error::ApiError;
use crate::server::ApiState;

#[derive(Debug, Deserialize)]
struct WsIncoming {
    body: String,
}

/// GET /v1/tickets/{id}/stream
///
/// The subscription is opened before the upgrade so an unknown ticket is
/// answered with 404 instead of an empty socket.
pub async fn stream_ticket(
    ws: WebSocketUpgrade,
    State(state): State<ApiState>,
    Path(id): Path<TicketId>,
) -> Result<Response, ApiError> {
    let (tx, rx) = mpsc::unbounded_channel::<SyncUpdate>();
    let handle = state
        .engine
        .sync
        .subscribe(&id, move |update| {
            let _ = tx.send(update);
        })
        .await?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, handle, rx)))
}

fn error_frame(message: &str) -> String {
    serde_json::json!({ "type": "error", "message": message }).to_string()
}

async fn handle_socket(
    socket: WebSocket,
    handle: SyncHandle,
    mut updates: mpsc::UnboundedReceiver<SyncUpdate>,
) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let ticket_id = handle.ticket_id().clone();
    tracing::debug!(ticket_id = %ticket_id, "ticket stream opened");

    loop {
        tokio::select! {
            update = updates.recv() => {
                let Some(update) = update else { break };
                let frame = match serde_json::to_string(&update) {
                    Ok(frame) => frame,
                    Err(e) => {
                        tracing::warn!("failed to serialize sync update: {e}");
                        continue;
                    }
                };
                if ws_sender.send(Message::Text(frame.into())).await.is_err() {
                    break;
                }
            }
            incoming = ws_receiver.next() => {
                let Some(Ok(msg)) = incoming else { break };
                match msg {
                    Message::Text(text) => {
                        let text_str: &str = &text;
                        let incoming: WsIncoming = match serde_json::from_str(text_str) {
                            Ok(v) => v,
                            Err(e) => {
                                tracing::warn!("invalid WebSocket message: {e}");
                                continue;
                            }
                        };
                        // The timeline update carries the result; only rejections need a frame.
                        if let Err(e) = handle.send(&incoming.body).await {
                            let frame = error_frame(&e.to_string());
                            if ws_sender.send(Message::Text(frame.into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    }

    handle.close().await;
    tracing::debug!(ticket_id = %ticket_id, "ticket stream closed");
}
