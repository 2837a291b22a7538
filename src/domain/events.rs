//! Outbound event payload catalog, per `spec.md` §6 ("Outbound event
//! payloads") and the broadcast points named throughout §4.4.

use serde::Serialize;

use super::types::{ConnId, LobbyState, PlayerRole, RoomId, TurnWordEntry};

/// Every JSON event the engine can emit to a connection, internally tagged
/// by `type` so the wire shape is a flat object (matching the informal
/// `{type: "...", ...}` shape described throughout the specification).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    UserJoined {
        room_id: RoomId,
        conn_id: ConnId,
        nickname: Option<String>,
    },
    UserLeft {
        room_id: RoomId,
        conn_id: ConnId,
    },
    UserRenamed {
        room_id: RoomId,
        conn_id: ConnId,
        nickname: String,
    },
    Kicked {
        room_id: RoomId,
        conn_id: ConnId,
    },
    Welcome {
        room_id: RoomId,
        conn_id: ConnId,
    },
    LobbyState(LobbyState),
    Msg {
        room: String,
        room_id: RoomId,
        nick: Option<String>,
        text: String,
    },
    Role {
        room_id: RoomId,
        role: PlayerRole,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        word: Option<String>,
    },
    GameStarted {
        room_id: RoomId,
    },
    RoundStarted {
        room_id: RoomId,
        round: u32,
        order: Vec<ConnId>,
        turn_duration: u64,
    },
    TurnStarted {
        room_id: RoomId,
        round: u32,
        turn_index: u32,
        conn_id: ConnId,
        turn_duration: u64,
    },
    TurnTimer {
        room_id: RoomId,
        round: u32,
        turn_index: u32,
        conn_id: ConnId,
        remaining: u64,
        phase: &'static str,
    },
    TurnPaused {
        room_id: RoomId,
        conn_id: ConnId,
        remaining: u64,
    },
    TurnResumed {
        room_id: RoomId,
        conn_id: ConnId,
        remaining: u64,
    },
    TurnEnded {
        room_id: RoomId,
        round: u32,
        turn_index: u32,
        conn_id: ConnId,
        reason: &'static str,
    },
    TurnWordSubmitted {
        room_id: RoomId,
        #[serde(flatten)]
        entry: TurnWordEntry,
    },
    RoundEnded {
        room_id: RoomId,
        round: u32,
    },
    VotingStarted {
        room_id: RoomId,
        round: u32,
        voters: Vec<ConnId>,
        vote_duration: u64,
    },
    VoteCast {
        room_id: RoomId,
        voter: ConnId,
        target: ConnId,
        votes: std::collections::BTreeMap<ConnId, ConnId>,
        tally: std::collections::BTreeMap<ConnId, u32>,
    },
    VotingResult {
        room_id: RoomId,
        result: serde_json::Value,
    },
    GameEnded {
        room_id: RoomId,
        result: serde_json::Value,
    },
    TurnState {
        room_id: RoomId,
        #[serde(flatten)]
        snapshot: serde_json::Value,
    },
}

impl ServerEvent {
    /// Serialize to the JSON object delivered to clients via `Notifier`.
    ///
    /// # Panics
    /// Never: every variant is built only from already-serializable data.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).expect("ServerEvent always serializes")
    }
}
