//! Core domain types shared by the store, service and transport layers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Opaque room identifier: 8 chars from the confusable-free alphabet.
pub type RoomId = String;
/// Opaque connection identifier: 16 hex chars.
pub type ConnId = String;

/// Lifecycle state of a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameState {
    Lobby,
    InProgress,
    Ended,
}

impl GameState {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Lobby => "lobby",
            Self::InProgress => "in_progress",
            Self::Ended => "ended",
        }
    }
}

impl std::str::FromStr for GameState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lobby" => Ok(Self::Lobby),
            "in_progress" => Ok(Self::InProgress),
            "ended" => Ok(Self::Ended),
            other => anyhow::bail!("unrecognized game_state '{other}'"),
        }
    }
}

/// A player's role for the duration of one game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerRole {
    Impostor,
    Crew,
}

impl PlayerRole {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Impostor => "impostor",
            Self::Crew => "crew",
        }
    }
}

impl std::str::FromStr for PlayerRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "impostor" => Ok(Self::Impostor),
            "crew" => Ok(Self::Crew),
            other => anyhow::bail!("unrecognized role '{other}'"),
        }
    }
}

/// Room-level configurable settings. Recognized integer fields with bounds
/// enforced by [`crate::domain::validation`]; unrecognized keys pass through
/// the store layer as raw strings (see `RoomStore::set_room_settings`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub max_players: u32,
    pub turn_duration: u64,
    pub round_time: u64,
    pub turn_grace: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_players: 8,
            turn_duration: 30,
            round_time: 60,
            turn_grace: 60,
        }
    }
}

impl Settings {
    pub const MAX_PLAYERS_BOUNDS: (u32, u32) = (2, 20);
    pub const TURN_DURATION_BOUNDS: (u64, u64) = (5, 300);
    pub const ROUND_TIME_BOUNDS: (u64, u64) = (10, 300);

    /// Render settings as the raw string map the store layer persists.
    #[must_use]
    pub fn to_raw(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("max_players".to_string(), self.max_players.to_string()),
            ("turn_duration".to_string(), self.turn_duration.to_string()),
            ("round_time".to_string(), self.round_time.to_string()),
            ("turn_grace".to_string(), self.turn_grace.to_string()),
        ])
    }

    /// Parse settings back out of the store's raw string map, falling back
    /// to defaults for any missing recognized key.
    #[must_use]
    pub fn from_raw(raw: &BTreeMap<String, String>) -> Self {
        let defaults = Self::default();
        Self {
            max_players: parse_or(raw.get("max_players"), defaults.max_players),
            turn_duration: parse_or(raw.get("turn_duration"), defaults.turn_duration),
            round_time: parse_or(raw.get("round_time"), defaults.round_time),
            turn_grace: parse_or(raw.get("turn_grace"), defaults.turn_grace),
        }
    }
}

fn parse_or<T: std::str::FromStr + Copy>(raw: Option<&String>, default: T) -> T {
    raw.and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// Per-connection attributes as stored by `RoomStore`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnAttrs {
    pub room_id: RoomId,
    pub nickname: Option<String>,
    pub ready: bool,
    pub role: Option<PlayerRole>,
}

/// A single player's lobby-facing view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerLobbyInfo {
    pub nick: Option<String>,
    pub ready: bool,
}

/// Snapshot returned by `RoomStore::get_lobby_state` / `RoomService` lobby
/// operations; this is also the `LobbyState` body returned by every lobby
/// HTTP endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LobbyState {
    pub room_id: RoomId,
    pub name: String,
    pub players: BTreeMap<ConnId, PlayerLobbyInfo>,
    pub host: Option<ConnId>,
    pub settings: Settings,
}

/// Current phase of a room's turn state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    Active,
    Paused,
    Voting,
}

/// The full turn-state record for a room (absent when no game is in
/// progress). See `spec.md` §3 for field semantics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnState {
    pub phase: TurnPhase,
    pub round: u32,
    pub turn_index: u32,
    pub current_conn_id: ConnId,
    pub turn_duration: u64,
    pub round_time: u64,
    pub turn_grace: u64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub deadline_ts: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub turn_remaining: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub grace_deadline_ts: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub vote_deadline_ts: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub voters: Vec<ConnId>,
}

/// One spoken entry: a word attributed to a conn at a given round/turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnWordEntry {
    pub word: String,
    pub conn_id: ConnId,
    pub round: u32,
    pub turn_index: u32,
}

/// Non-consuming/consuming resume-token snapshot, per `spec.md` §3/§4.1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumeSnapshot {
    pub room_id: RoomId,
    pub conn_id: ConnId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ready: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<PlayerRole>,
}

/// Wall-clock seconds-since-epoch helper, used throughout the engine for
/// deadline arithmetic. Durations involved are short enough that wall-clock
/// is acceptable, per `spec.md` §9.
#[must_use]
pub fn now_ts() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}
