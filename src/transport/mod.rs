//! Transport adapter: maps inbound HTTP/WS messages to service calls and
//! routes `Notifier` deliveries back to sockets, per `spec.md` §6.
//!
//! Grounded in the teacher's `websocket::routes`/`websocket::handler` split
//! (axum router + connection upgrade) and `server.rs`'s `Arc<...>` shared
//! state, generalized from one `EnhancedGameServer` to the pair of
//! `RoomService`/`GameService`.

pub mod http;
pub mod ws;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::notify::InMemoryNotifier;
use crate::service::{GameService, RoomService};

/// Shared application state injected into every handler via `State`.
#[derive(Clone)]
pub struct AppState {
    pub room_service: Arc<RoomService>,
    pub game_service: Arc<GameService>,
    pub notifier: Arc<InMemoryNotifier>,
}

/// Build the full HTTP + WebSocket router, per `spec.md` §6.
pub fn create_router(state: AppState) -> Router {
    use tower_http::cors::{Any, CorsLayer};

    Router::new()
        .route("/rooms/", post(http::create_room))
        .route("/rooms/{room_id}/lobby", get(http::get_lobby))
        .route("/rooms/{room_id}/ready", post(http::set_ready))
        .route("/rooms/{room_id}/nick", post(http::set_nickname))
        .route("/rooms/{room_id}/settings", post(http::update_settings))
        .route("/rooms/{room_id}/kick", post(http::kick_player))
        .route("/rooms/{room_id}/start", post(http::start_game))
        .route("/rooms/{room_id}/end", post(http::end_game))
        .route("/rooms/{room_id}/vote", post(http::cast_vote))
        .route("/rooms/{room_id}/disconnect", post(http::disconnect))
        .route("/rooms/reconnect", post(http::reconnect))
        .route("/rooms/{room_id}/ws", get(ws::ws_handler))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
