//! `RoomStore` — the abstract durable-state port from `spec.md` §4.1.
//!
//! Grounded in the teacher's `GameDatabase` async trait (`database/mod.rs`):
//! a single capability trait implemented by an in-memory reference store
//! (tests) and a Redis-backed store (production), selected at startup the
//! same way the teacher's `DatabaseConfig` selects a backend.

pub mod memory;
pub mod redis_store;

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;

use crate::domain::{ConnAttrs, ConnId, GameState, LobbyState, PlayerRole, RoomId, TurnState};

pub use memory::InMemoryRoomStore;
pub use redis_store::RedisRoomStore;

/// Durable state for rooms, membership, game phase, turn state and resume
/// tokens. None of these operations raise except where noted; unknown ids
/// resolve to `Ok(None)`/empty collections so callers can apply
/// `spec.md` §4.3's "room not found" checks uniformly.
#[async_trait]
pub trait RoomStore: Send + Sync {
    // -- Room lifecycle ---------------------------------------------------
    async fn create_room(&self, room_id: &str, name: &str) -> anyhow::Result<()>;
    async fn get_room_name(&self, room_id: &str) -> anyhow::Result<Option<String>>;
    async fn set_game_state(&self, room_id: &str, state: GameState) -> anyhow::Result<()>;
    async fn get_game_state(&self, room_id: &str) -> anyhow::Result<Option<GameState>>;
    /// Persists `result` (defaulting to `{"reason": "win_condition"}`), sets
    /// `game_state = ended`, and returns the stored result.
    async fn end_game(
        &self,
        room_id: &str,
        result: Option<serde_json::Value>,
    ) -> anyhow::Result<serde_json::Value>;

    // -- Membership ---------------------------------------------------------
    /// Adds the conn to the room; if no host is set yet, this conn becomes
    /// host (set-if-absent, matching `setnx` semantics in the reference
    /// Redis implementation).
    async fn add_conn(
        &self,
        room_id: &str,
        conn_id: &str,
        nickname: Option<&str>,
        ready: bool,
    ) -> anyhow::Result<()>;
    /// Removes the conn; if it was host, reassigns to the lexicographically
    /// smallest remaining conn id, or clears the host if none remain.
    async fn remove_conn(&self, room_id: &str, conn_id: &str) -> anyhow::Result<()>;
    async fn list_conns(&self, room_id: &str) -> anyhow::Result<BTreeSet<ConnId>>;
    async fn get_host(&self, room_id: &str) -> anyhow::Result<Option<ConnId>>;
    async fn get_conn(&self, room_id: &str, conn_id: &str) -> anyhow::Result<Option<ConnAttrs>>;

    // -- Per-conn attributes --------------------------------------------------
    async fn set_ready(&self, room_id: &str, conn_id: &str, ready: bool) -> anyhow::Result<()>;
    async fn set_nickname(
        &self,
        room_id: &str,
        conn_id: &str,
        nickname: &str,
    ) -> anyhow::Result<()>;
    async fn set_role(&self, room_id: &str, conn_id: &str, role: PlayerRole) -> anyhow::Result<()>;

    // -- Lobby snapshot / settings --------------------------------------------
    async fn get_lobby_state(&self, room_id: &str) -> anyhow::Result<Option<LobbyState>>;
    async fn get_room_settings_raw(&self, room_id: &str) -> anyhow::Result<BTreeMap<String, String>>;
    async fn set_room_settings_raw(
        &self,
        room_id: &str,
        settings: BTreeMap<String, String>,
    ) -> anyhow::Result<()>;

    // -- Roles / secret word --------------------------------------------------
    async fn set_secret_word(&self, room_id: &str, word: &str) -> anyhow::Result<()>;
    async fn get_secret_word(&self, room_id: &str) -> anyhow::Result<Option<String>>;
    async fn set_impostor(&self, room_id: &str, conn_id: &str) -> anyhow::Result<()>;
    async fn get_impostor(&self, room_id: &str) -> anyhow::Result<Option<ConnId>>;
    /// Clears every member's role plus the stored word/impostor.
    async fn clear_roles(&self, room_id: &str) -> anyhow::Result<()>;

    // -- Turn order / state / words / history / votes -------------------------
    async fn set_turn_order(&self, room_id: &str, order: Vec<ConnId>) -> anyhow::Result<()>;
    async fn get_turn_order(&self, room_id: &str) -> anyhow::Result<Vec<ConnId>>;

    async fn set_turn_state(&self, room_id: &str, state: &TurnState) -> anyhow::Result<()>;
    async fn get_turn_state(&self, room_id: &str) -> anyhow::Result<Option<TurnState>>;
    /// Clears turn state, turn order, and votes together (they share a
    /// lifecycle: all three are only meaningful while a game is running).
    async fn clear_turn_state(&self, room_id: &str) -> anyhow::Result<()>;

    async fn append_turn_word(
        &self,
        room_id: &str,
        entry: &crate::domain::TurnWordEntry,
    ) -> anyhow::Result<()>;
    async fn get_turn_words(&self, room_id: &str) -> anyhow::Result<Vec<crate::domain::TurnWordEntry>>;
    async fn clear_turn_words(&self, room_id: &str) -> anyhow::Result<()>;

    async fn append_word_history(
        &self,
        room_id: &str,
        entry: &crate::domain::TurnWordEntry,
    ) -> anyhow::Result<()>;
    async fn get_word_history(&self, room_id: &str) -> anyhow::Result<Vec<crate::domain::TurnWordEntry>>;
    async fn clear_word_history(&self, room_id: &str) -> anyhow::Result<()>;

    async fn set_vote(&self, room_id: &str, voter: &str, target: &str) -> anyhow::Result<()>;
    async fn get_votes(&self, room_id: &str) -> anyhow::Result<BTreeMap<ConnId, ConnId>>;
    async fn clear_votes(&self, room_id: &str) -> anyhow::Result<()>;

    // -- Resume tokens ---------------------------------------------------------
    async fn issue_resume_token(&self, room_id: &str, conn_id: &str) -> anyhow::Result<String>;
    async fn peek_resume_token(
        &self,
        token: &str,
    ) -> anyhow::Result<Option<crate::domain::ResumeSnapshot>>;
    async fn consume_resume_token(
        &self,
        token: &str,
    ) -> anyhow::Result<Option<crate::domain::ResumeSnapshot>>;
}

/// Which `RoomStore` backend to construct, selected from configuration the
/// same way the teacher's `DatabaseConfig` picks an in-memory vs. networked
/// backend.
#[derive(Debug, Clone)]
pub enum StoreBackend {
    InMemory,
    Redis { url: String },
}

/// Construct the configured `RoomStore` implementation. `default_settings`
/// is applied to every room the store creates — the
/// `redis_room_store.settings` block from configuration, per `spec.md` §6.
pub async fn create_store(
    backend: StoreBackend,
    default_settings: crate::domain::Settings,
) -> anyhow::Result<std::sync::Arc<dyn RoomStore>> {
    match backend {
        StoreBackend::InMemory => {
            Ok(std::sync::Arc::new(InMemoryRoomStore::with_default_settings(default_settings)))
        }
        StoreBackend::Redis { url } => {
            let store = RedisRoomStore::connect(&url, default_settings).await?;
            Ok(std::sync::Arc::new(store))
        }
    }
}
