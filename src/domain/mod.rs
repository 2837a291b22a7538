//! Domain model: room/connection/turn state types, outbound events, the
//! four-kind error model, identifier generation, and validation — the
//! vocabulary shared by the store, service and transport layers.

pub mod error;
pub mod events;
pub mod ids;
pub mod types;
pub mod validation;
pub mod word_pool;

pub use error::{ServiceError, ServiceResult};
pub use events::ServerEvent;
pub use types::{
    ConnAttrs, ConnId, GameState, LobbyState, PlayerLobbyInfo, PlayerRole, ResumeSnapshot, RoomId,
    Settings, TurnPhase, TurnState, TurnWordEntry, now_ts,
};
