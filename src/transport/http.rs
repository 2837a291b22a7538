//! REST handlers for the lobby/game RPC surface, per `spec.md` §6.
//!
//! Shape grounded in the teacher's `websocket::routes::health_check`
//! (`State<Arc<...>>` extractor, `axum::response::Result`), generalized to
//! one handler per endpoint instead of one combined WS protocol.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use crate::domain::{LobbyState, RoomId, ServiceError};

use super::AppState;

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if matches!(self, Self::Internal(_)) {
            tracing::error!(error = %self, "internal error handling request");
        }
        (status, Json(serde_json::json!({"error": self.to_string(), "kind": self.kind()}))).into_response()
    }
}

type HttpResult<T> = Result<Json<T>, ServiceError>;

#[derive(Debug, Deserialize)]
pub struct CreateRoomRequest {
    name: String,
}

pub async fn create_room(
    State(state): State<AppState>,
    Json(req): Json<CreateRoomRequest>,
) -> HttpResult<serde_json::Value> {
    let (room_id, name) = state.room_service.create_room(&req.name).await?;
    Ok(Json(serde_json::json!({"room_id": room_id, "name": name})))
}

pub async fn get_lobby(
    State(state): State<AppState>,
    Path(room_id): Path<RoomId>,
) -> HttpResult<LobbyState> {
    Ok(Json(state.room_service.get_lobby(&room_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct SetReadyRequest {
    conn_id: String,
    ready: bool,
}

pub async fn set_ready(
    State(state): State<AppState>,
    Path(room_id): Path<RoomId>,
    Json(req): Json<SetReadyRequest>,
) -> HttpResult<LobbyState> {
    Ok(Json(state.room_service.set_ready(&room_id, &req.conn_id, req.ready).await?))
}

#[derive(Debug, Deserialize)]
pub struct SetNicknameRequest {
    conn_id: String,
    nickname: String,
}

pub async fn set_nickname(
    State(state): State<AppState>,
    Path(room_id): Path<RoomId>,
    Json(req): Json<SetNicknameRequest>,
) -> HttpResult<LobbyState> {
    Ok(Json(
        state
            .room_service
            .set_nickname(&room_id, &req.conn_id, &req.conn_id, &req.nickname)
            .await?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct UpdateSettingsRequest {
    conn_id: String,
    max_players: Option<u32>,
    turn_duration: Option<u64>,
    round_time: Option<u64>,
}

pub async fn update_settings(
    State(state): State<AppState>,
    Path(room_id): Path<RoomId>,
    Json(req): Json<UpdateSettingsRequest>,
) -> HttpResult<LobbyState> {
    Ok(Json(
        state
            .room_service
            .update_settings(&room_id, &req.conn_id, req.max_players, req.turn_duration, req.round_time)
            .await?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct KickRequest {
    conn_id: String,
    target_conn_id: String,
}

pub async fn kick_player(
    State(state): State<AppState>,
    Path(room_id): Path<RoomId>,
    Json(req): Json<KickRequest>,
) -> HttpResult<LobbyState> {
    Ok(Json(
        state.room_service.kick_player(&room_id, &req.conn_id, &req.target_conn_id).await?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct StartGameRequest {
    conn_id: String,
}

pub async fn start_game(
    State(state): State<AppState>,
    Path(room_id): Path<RoomId>,
    Json(req): Json<StartGameRequest>,
) -> HttpResult<serde_json::Value> {
    state.game_service.start_game(&room_id, &req.conn_id).await?;
    Ok(Json(serde_json::json!({"status": "started"})))
}

#[derive(Debug, Default, Deserialize)]
pub struct EndGameRequest {
    result: Option<serde_json::Value>,
}

pub async fn end_game(
    State(state): State<AppState>,
    Path(room_id): Path<RoomId>,
    body: Option<Json<EndGameRequest>>,
) -> HttpResult<serde_json::Value> {
    let result = body.map(|Json(req)| req.result).unwrap_or(None);
    let result = state.game_service.end_game(&room_id, result).await?;
    Ok(Json(serde_json::json!({"result": result})))
}

#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    conn_id: String,
    target_conn_id: String,
}

pub async fn cast_vote(
    State(state): State<AppState>,
    Path(room_id): Path<RoomId>,
    Json(req): Json<VoteRequest>,
) -> HttpResult<serde_json::Value> {
    Ok(Json(state.game_service.cast_vote(&room_id, &req.conn_id, &req.target_conn_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct DisconnectRequest {
    conn_id: String,
}

pub async fn disconnect(
    State(state): State<AppState>,
    Path(room_id): Path<RoomId>,
    Json(req): Json<DisconnectRequest>,
) -> HttpResult<serde_json::Value> {
    let token = state.room_service.disconnect(&room_id, &req.conn_id).await?;
    Ok(Json(serde_json::json!({"token": token})))
}

#[derive(Debug, Deserialize)]
pub struct ReconnectRequest {
    token: String,
}

pub async fn reconnect(
    State(state): State<AppState>,
    Json(req): Json<ReconnectRequest>,
) -> HttpResult<LobbyState> {
    let (_, lobby) = state.room_service.reconnect(&req.token).await?;
    Ok(Json(lobby))
}
