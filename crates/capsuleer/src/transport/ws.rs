// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket stream of auth events.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::events::AuthEvent;
use crate::state::AppState;
use crate::transport::auth;

#[derive(Debug, Clone, Deserialize)]
pub struct EventsQuery {
    pub token: Option<String>,
}

/// `GET /ws/events`: upgrade and stream every [`AuthEvent`] as JSON text.
pub async fn ws_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EventsQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    if let Err(code) =
        auth::validate_ws_token(query.token.as_deref(), state.auth_token.as_deref())
    {
        return code.to_http_response("unauthorized").into_response();
    }

    let rx = state.flows.subscribe();
    let shutdown = state.shutdown.clone();
    ws.on_upgrade(move |socket| handle_ws(socket, rx, shutdown)).into_response()
}

async fn handle_ws(
    socket: WebSocket,
    mut rx: broadcast::Receiver<AuthEvent>,
    shutdown: CancellationToken,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,

            event = rx.recv() => {
                match event {
                    Ok(event) => {
                        let Ok(text) = serde_json::to_string(&event) else {
                            continue;
                        };
                        if ws_tx.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::debug!(lagged = n, "event subscriber lagged, skipping");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }

            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }

    let _ = ws_tx.close().await;
}
