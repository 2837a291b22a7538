//! WebSocket handler for `/rooms/{room_id}/ws`, per `spec.md` §6.
//!
//! Grounded in the teacher's `websocket::connection::handle_socket`: split
//! the socket, spawn a task that drains the per-conn `Notifier` channel into
//! the write half, and run the inbound read loop in the upgrade task
//! itself. Simplified relative to the teacher (no batching, no
//! authentication handshake) since neither applies to this protocol.

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use axum::extract::{Path, Query, State};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::domain::{ids, ConnId, PlayerRole, RoomId, ServerEvent};

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    nick: Option<String>,
    token: Option<String>,
}

pub async fn ws_handler(
    ws: axum::extract::ws::WebSocketUpgrade,
    Path(room_id): Path<RoomId>,
    Query(params): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, room_id, params, state))
}

/// The identity a connection resolves to before its session starts.
struct Identity {
    room_id: RoomId,
    conn_id: ConnId,
    nick: Option<String>,
    role: Option<PlayerRole>,
    is_reconnect: bool,
}

async fn resolve_identity(
    state: &AppState,
    room_id: &str,
    params: &WsQuery,
) -> Result<Identity, String> {
    if let Some(token) = params.token.as_deref() {
        // Validate the token (and its room) before consuming it — consuming
        // first would burn a single-use token and re-seat the conn in its
        // room even when the request names a different room, with no way
        // to roll either back.
        let preview = state
            .room_service
            .preview_reconnect(token)
            .await
            .map_err(|_| "unknown resume token".to_string())?;
        if preview.room_id != room_id {
            return Err("room mismatch for resume token".to_string());
        }
        let (snapshot, _lobby) = state
            .room_service
            .reconnect(token)
            .await
            .map_err(|_| "unknown resume token".to_string())?;
        return Ok(Identity {
            room_id: snapshot.room_id,
            conn_id: snapshot.conn_id,
            nick: snapshot.nickname,
            role: snapshot.role,
            is_reconnect: true,
        });
    }

    if let Some(nick) = params.nick.as_deref() {
        let conn_id = ids::generate_conn_id();
        state
            .room_service
            .join_room(room_id, &conn_id, Some(nick))
            .await
            .map_err(|e| e.to_string())?;
        return Ok(Identity {
            room_id: room_id.to_string(),
            conn_id,
            nick: Some(nick.to_string()),
            role: None,
            is_reconnect: false,
        });
    }

    Err("missing room".to_string())
}

async fn handle_socket(socket: WebSocket, room_id: RoomId, params: WsQuery, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    let identity = match resolve_identity(&state, &room_id, &params).await {
        Ok(identity) => identity,
        Err(reason) => {
            close_with_policy_violation(&mut sender, &reason).await;
            return;
        }
    };

    let Identity { room_id, conn_id, nick, role, is_reconnect } = identity;

    let (tx, rx) = mpsc::channel::<serde_json::Value>(32);
    state.notifier.register(&conn_id, tx);
    let send_task = tokio::spawn(write_loop(sender, rx));

    state
        .notifier
        .send_to_conn(&conn_id, ServerEvent::Welcome { room_id: room_id.clone(), conn_id: conn_id.clone() }.to_json())
        .await;

    if let Ok(lobby) = state.room_service.get_lobby(&room_id).await {
        state.notifier.send_to_conn(&conn_id, ServerEvent::LobbyState(lobby).to_json()).await;
    }

    if let Ok(Some(snapshot)) = state.game_service.get_turn_snapshot(&room_id).await {
        state
            .notifier
            .send_to_conn(&conn_id, ServerEvent::TurnState { room_id: room_id.clone(), snapshot }.to_json())
            .await;
    }

    if is_reconnect {
        state.game_service.handle_reconnect(&room_id, &conn_id, role).await;
        if let Ok(lobby) = state.room_service.get_lobby(&room_id).await {
            let others: Vec<ConnId> =
                lobby.players.keys().filter(|id| id.as_str() != conn_id).cloned().collect();
            state
                .notifier
                .broadcast(
                    &others,
                    ServerEvent::UserJoined {
                        room_id: room_id.clone(),
                        conn_id: conn_id.clone(),
                        nickname: nick.clone(),
                    }
                    .to_json(),
                )
                .await;
        }
    }

    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                let lobby = state.room_service.get_lobby(&room_id).await.ok();
                let room_name = lobby.as_ref().map(|l| l.name.clone()).unwrap_or_default();
                let members =
                    lobby.map(|l| l.players.keys().cloned().collect::<Vec<_>>()).unwrap_or_default();
                state
                    .notifier
                    .broadcast(
                        &members,
                        ServerEvent::Msg {
                            room: room_name,
                            room_id: room_id.clone(),
                            nick: nick.clone(),
                            text: text.to_string(),
                        }
                        .to_json(),
                    )
                    .await;
                state.game_service.handle_turn_message(&room_id, &conn_id).await;
            }
            Ok(Message::Close(_)) => break,
            Err(_) => break,
            _ => {}
        }
    }

    state.game_service.handle_disconnect(&room_id, &conn_id).await;
    let _ = state.room_service.leave_room(&room_id, &conn_id).await;
    state.notifier.close_conn(&conn_id).await;
    let _ = send_task.await;
}

/// Drains `rx` into the socket's write half, forwarding each queued payload
/// as a text frame. Channel closure (the `Notifier` dropping its registered
/// sender on `close_conn`) ends the loop and closes the socket.
async fn write_loop(
    mut sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<serde_json::Value>,
) {
    while let Some(payload) = rx.recv().await {
        if sender.send(Message::Text(payload.to_string().into())).await.is_err() {
            break;
        }
    }
    let _ = sender.close().await;
}

async fn close_with_policy_violation(
    sender: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    reason: &str,
) {
    let _ = sender
        .send(Message::Close(Some(CloseFrame {
            code: close_code::POLICY,
            reason: reason.to_string().into(),
        })))
        .await;
}
