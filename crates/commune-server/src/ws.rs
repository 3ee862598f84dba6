//! WebSocket endpoint for realtime delivery.
//!
//! Each socket gets one bounded outbound queue drained by a writer task.
//! Everything pushed to the client (replies, presence, new messages) goes
//! through that queue.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::Response,
};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use commune_shared::protocol::{ClientFrame, ServerFrame};
use commune_shared::types::{GroupId, UserId};
use commune_shared::DomainError;

use crate::api::AppState;
use crate::auth::{extract_token, AuthUser};
use crate::error::{OrNotFound, ServerError};
use crate::registry::ConnectionHandle;

/// Query parameters for the upgrade request.
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    #[serde(default)]
    pub token: Option<String>,
}

/// Authenticate, then upgrade. Browsers cannot set headers on a WebSocket
/// handshake, so the token may also come from the query string.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Response, ServerError> {
    let token = query
        .token
        .filter(|t| !t.is_empty())
        .or_else(|| extract_token(&headers))
        .ok_or(ServerError::Unauthenticated)?;
    let user = AuthUser::from_token(&state, &token).await?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, user.id, state)))
}

async fn handle_socket(socket: WebSocket, user: UserId, state: AppState) {
    let (handle, mut rx) = ConnectionHandle::new(user, state.config.outbound_queue_size);
    let conn = handle.id;
    info!(%conn, user = %user, "WebSocket connected");

    attach(&state, &handle).await;

    let (mut ws_sender, mut ws_receiver) = socket.split();

    let send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            match frame.to_json() {
                Ok(text) => {
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(e) => error!(error = %e, "Failed to serialize frame"),
            }
        }
    });

    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(Message::Text(text)) => handle_text(&text, &handle, &state).await,
            Ok(Message::Close(_)) => {
                debug!(%conn, "WebSocket close requested");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(%conn, error = %e, "WebSocket error");
                break;
            }
        }
    }

    state.rooms.leave_all(conn).await;
    if state.registry.unregister(user, conn).await {
        broadcast_presence(&state).await;
    }
    send_task.abort();
    info!(%conn, user = %user, "WebSocket closed");
}

/// Make `handle` the user's live connection. A superseded connection stops
/// receiving group traffic even while its socket lingers.
async fn attach(state: &AppState, handle: &ConnectionHandle) {
    if let Some(old) = state.registry.register(handle.clone()).await {
        state.rooms.leave_all(old.id).await;
    }
    broadcast_presence(state).await;
}

/// Answer one client frame on the connection's own queue.
async fn handle_text(text: &str, handle: &ConnectionHandle, state: &AppState) {
    let reply = match ClientFrame::from_json(text) {
        Ok(ClientFrame::JoinGroup { group_id }) => match join_room(state, handle, group_id).await {
            Ok(()) => ServerFrame::Joined { group_id },
            Err(e) => error_frame(e),
        },
        Ok(ClientFrame::LeaveGroup { group_id }) => {
            state.rooms.leave(handle.id, group_id).await;
            ServerFrame::Left { group_id }
        }
        Ok(ClientFrame::Ping) => ServerFrame::Pong {
            server_time: Utc::now(),
        },
        Err(e) => {
            warn!(conn = %handle.id, error = %e, "Failed to parse client frame");
            ServerFrame::Error {
                error: format!("Invalid frame: {e}"),
            }
        }
    };
    handle.push(reply);
}

/// Only members may subscribe to a group's channel.
async fn join_room(
    state: &AppState,
    handle: &ConnectionHandle,
    group: GroupId,
) -> Result<(), ServerError> {
    let is_member = {
        let db = state.db.lock().await;
        db.get_group(group)
            .or_not_found("Group not found")?
            .is_member(&handle.user_id)
    };
    if !is_member {
        return Err(DomainError::unauthorized("You must be a member of the group").into());
    }
    state.rooms.join(handle, group).await;
    Ok(())
}

fn error_frame(e: ServerError) -> ServerFrame {
    let error = if e.status().is_server_error() {
        error!(error = %e, "Realtime request failed");
        "Internal server error".to_string()
    } else {
        e.to_string()
    };
    ServerFrame::Error { error }
}

async fn broadcast_presence(state: &AppState) {
    let users = state.registry.online_users().await;
    state
        .registry
        .broadcast(&ServerFrame::OnlineUsers { users })
        .await;
}
