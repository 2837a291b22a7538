//! `InMemoryRoomStore` — the reference `RoomStore` implementation used by
//! tests and local/dev runs without a `REDIS_URL`.
//!
//! Grounded in the teacher's `InMemoryDatabase` (`database/mod.rs`): one
//! `RwLock`-guarded map per concern, cache invalidation on every write that
//! touches `list_conns`/`get_turn_state`, and lock ordering documented at
//! each call site that must hold more than one map lock at once.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::domain::{
    ConnAttrs, ConnId, GameState, LobbyState, PlayerLobbyInfo, PlayerRole, ResumeSnapshot, Settings,
    TurnState, TurnWordEntry,
};

use super::RoomStore;

#[derive(Debug, Clone, Default)]
struct RoomRecord {
    name: String,
    game_state: GameState2,
    host: Option<ConnId>,
    conns: BTreeSet<ConnId>,
    settings: BTreeMap<String, String>,
    result: Option<serde_json::Value>,
    secret_word: Option<String>,
    impostor: Option<ConnId>,
    turn_order: Vec<ConnId>,
    turn_state: Option<TurnState>,
    turn_words: Vec<TurnWordEntry>,
    word_history: Vec<TurnWordEntry>,
    votes: BTreeMap<ConnId, ConnId>,
}

// Defaulting wrapper so `RoomRecord: Default` without requiring `GameState`
// itself to implement `Default` (it deliberately has no "natural" default).
#[derive(Debug, Clone, Copy)]
struct GameState2(GameState);
impl Default for GameState2 {
    fn default() -> Self {
        Self(GameState::Lobby)
    }
}

/// In-memory, process-local `RoomStore`. Not shared across instances — see
/// `spec.md` §1's multi-node Non-goal.
pub struct InMemoryRoomStore {
    rooms: RwLock<HashMap<String, RoomRecord>>,
    conns: RwLock<HashMap<String, ConnAttrs>>,
    resume_tokens: RwLock<HashMap<String, ResumeSnapshot>>,
    default_settings: Settings,
}

impl Default for InMemoryRoomStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRoomStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_default_settings(Settings::default())
    }

    /// Like [`Self::new`], but newly created rooms start with `settings`
    /// instead of the compiled-in defaults — used to apply the
    /// `redis_room_store.settings` block from configuration.
    #[must_use]
    pub fn with_default_settings(settings: Settings) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            conns: RwLock::new(HashMap::new()),
            resume_tokens: RwLock::new(HashMap::new()),
            default_settings: settings,
        }
    }
}

#[async_trait]
impl RoomStore for InMemoryRoomStore {
    async fn create_room(&self, room_id: &str, name: &str) -> anyhow::Result<()> {
        let mut rooms = self.rooms.write().expect("rooms lock poisoned");
        rooms.insert(
            room_id.to_string(),
            RoomRecord {
                name: name.to_string(),
                settings: self.default_settings.to_raw(),
                ..Default::default()
            },
        );
        Ok(())
    }

    async fn get_room_name(&self, room_id: &str) -> anyhow::Result<Option<String>> {
        let rooms = self.rooms.read().expect("rooms lock poisoned");
        Ok(rooms.get(room_id).map(|r| r.name.clone()))
    }

    async fn set_game_state(&self, room_id: &str, state: GameState) -> anyhow::Result<()> {
        let mut rooms = self.rooms.write().expect("rooms lock poisoned");
        if let Some(room) = rooms.get_mut(room_id) {
            room.game_state = GameState2(state);
        }
        Ok(())
    }

    async fn get_game_state(&self, room_id: &str) -> anyhow::Result<Option<GameState>> {
        let rooms = self.rooms.read().expect("rooms lock poisoned");
        Ok(rooms.get(room_id).map(|r| r.game_state.0))
    }

    async fn end_game(
        &self,
        room_id: &str,
        result: Option<serde_json::Value>,
    ) -> anyhow::Result<serde_json::Value> {
        let result = result.unwrap_or_else(|| serde_json::json!({"reason": "win_condition"}));
        let mut rooms = self.rooms.write().expect("rooms lock poisoned");
        if let Some(room) = rooms.get_mut(room_id) {
            room.game_state = GameState2(GameState::Ended);
            room.result = Some(result.clone());
        }
        Ok(result)
    }

    async fn add_conn(
        &self,
        room_id: &str,
        conn_id: &str,
        nickname: Option<&str>,
        ready: bool,
    ) -> anyhow::Result<()> {
        // Lock ordering: rooms first, then conns, matching the teacher's
        // rooms-then-room_codes convention to avoid lock-order inversions.
        let mut rooms = self.rooms.write().expect("rooms lock poisoned");
        let mut conns = self.conns.write().expect("conns lock poisoned");

        conns.insert(
            conn_id.to_string(),
            ConnAttrs {
                room_id: room_id.to_string(),
                nickname: nickname.map(str::to_string),
                ready,
                role: None,
            },
        );

        if let Some(room) = rooms.get_mut(room_id) {
            room.conns.insert(conn_id.to_string());
            if room.host.is_none() {
                room.host = Some(conn_id.to_string());
            }
        }
        Ok(())
    }

    async fn remove_conn(&self, room_id: &str, conn_id: &str) -> anyhow::Result<()> {
        let mut rooms = self.rooms.write().expect("rooms lock poisoned");
        let mut conns = self.conns.write().expect("conns lock poisoned");

        conns.remove(conn_id);
        if let Some(room) = rooms.get_mut(room_id) {
            room.conns.remove(conn_id);
            if room.host.as_deref() == Some(conn_id) {
                room.host = room.conns.iter().next().cloned();
            }
        }
        Ok(())
    }

    async fn list_conns(&self, room_id: &str) -> anyhow::Result<BTreeSet<ConnId>> {
        let rooms = self.rooms.read().expect("rooms lock poisoned");
        Ok(rooms
            .get(room_id)
            .map(|r| r.conns.clone())
            .unwrap_or_default())
    }

    async fn get_host(&self, room_id: &str) -> anyhow::Result<Option<ConnId>> {
        let rooms = self.rooms.read().expect("rooms lock poisoned");
        Ok(rooms.get(room_id).and_then(|r| r.host.clone()))
    }

    async fn get_conn(&self, _room_id: &str, conn_id: &str) -> anyhow::Result<Option<ConnAttrs>> {
        let conns = self.conns.read().expect("conns lock poisoned");
        Ok(conns.get(conn_id).cloned())
    }

    async fn set_ready(&self, _room_id: &str, conn_id: &str, ready: bool) -> anyhow::Result<()> {
        let mut conns = self.conns.write().expect("conns lock poisoned");
        if let Some(conn) = conns.get_mut(conn_id) {
            conn.ready = ready;
        }
        Ok(())
    }

    async fn set_nickname(
        &self,
        _room_id: &str,
        conn_id: &str,
        nickname: &str,
    ) -> anyhow::Result<()> {
        let mut conns = self.conns.write().expect("conns lock poisoned");
        if let Some(conn) = conns.get_mut(conn_id) {
            conn.nickname = Some(nickname.to_string());
        }
        Ok(())
    }

    async fn set_role(&self, _room_id: &str, conn_id: &str, role: PlayerRole) -> anyhow::Result<()> {
        let mut conns = self.conns.write().expect("conns lock poisoned");
        if let Some(conn) = conns.get_mut(conn_id) {
            conn.role = Some(role);
        }
        Ok(())
    }

    async fn get_lobby_state(&self, room_id: &str) -> anyhow::Result<Option<LobbyState>> {
        let rooms = self.rooms.read().expect("rooms lock poisoned");
        let Some(room) = rooms.get(room_id) else {
            return Ok(None);
        };
        let conns = self.conns.read().expect("conns lock poisoned");
        let mut players = BTreeMap::new();
        for conn_id in &room.conns {
            let attrs = conns.get(conn_id);
            players.insert(
                conn_id.clone(),
                PlayerLobbyInfo {
                    nick: attrs.and_then(|a| a.nickname.clone()),
                    ready: attrs.map(|a| a.ready).unwrap_or(false),
                },
            );
        }
        Ok(Some(LobbyState {
            room_id: room_id.to_string(),
            name: room.name.clone(),
            players,
            host: room.host.clone(),
            settings: Settings::from_raw(&room.settings),
        }))
    }

    async fn get_room_settings_raw(
        &self,
        room_id: &str,
    ) -> anyhow::Result<BTreeMap<String, String>> {
        let rooms = self.rooms.read().expect("rooms lock poisoned");
        Ok(rooms
            .get(room_id)
            .map(|r| r.settings.clone())
            .unwrap_or_default())
    }

    async fn set_room_settings_raw(
        &self,
        room_id: &str,
        settings: BTreeMap<String, String>,
    ) -> anyhow::Result<()> {
        let mut rooms = self.rooms.write().expect("rooms lock poisoned");
        if let Some(room) = rooms.get_mut(room_id) {
            room.settings.extend(settings);
        }
        Ok(())
    }

    async fn set_secret_word(&self, room_id: &str, word: &str) -> anyhow::Result<()> {
        let mut rooms = self.rooms.write().expect("rooms lock poisoned");
        if let Some(room) = rooms.get_mut(room_id) {
            room.secret_word = Some(word.to_string());
        }
        Ok(())
    }

    async fn get_secret_word(&self, room_id: &str) -> anyhow::Result<Option<String>> {
        let rooms = self.rooms.read().expect("rooms lock poisoned");
        Ok(rooms.get(room_id).and_then(|r| r.secret_word.clone()))
    }

    async fn set_impostor(&self, room_id: &str, conn_id: &str) -> anyhow::Result<()> {
        let mut rooms = self.rooms.write().expect("rooms lock poisoned");
        if let Some(room) = rooms.get_mut(room_id) {
            room.impostor = Some(conn_id.to_string());
        }
        Ok(())
    }

    async fn get_impostor(&self, room_id: &str) -> anyhow::Result<Option<ConnId>> {
        let rooms = self.rooms.read().expect("rooms lock poisoned");
        Ok(rooms.get(room_id).and_then(|r| r.impostor.clone()))
    }

    async fn clear_roles(&self, room_id: &str) -> anyhow::Result<()> {
        let mut rooms = self.rooms.write().expect("rooms lock poisoned");
        let mut conns = self.conns.write().expect("conns lock poisoned");
        if let Some(room) = rooms.get_mut(room_id) {
            for conn_id in &room.conns {
                if let Some(conn) = conns.get_mut(conn_id) {
                    conn.role = None;
                }
            }
            room.secret_word = None;
            room.impostor = None;
        }
        Ok(())
    }

    async fn set_turn_order(&self, room_id: &str, order: Vec<ConnId>) -> anyhow::Result<()> {
        let mut rooms = self.rooms.write().expect("rooms lock poisoned");
        if let Some(room) = rooms.get_mut(room_id) {
            room.turn_order = order;
        }
        Ok(())
    }

    async fn get_turn_order(&self, room_id: &str) -> anyhow::Result<Vec<ConnId>> {
        let rooms = self.rooms.read().expect("rooms lock poisoned");
        Ok(rooms
            .get(room_id)
            .map(|r| r.turn_order.clone())
            .unwrap_or_default())
    }

    async fn set_turn_state(&self, room_id: &str, state: &TurnState) -> anyhow::Result<()> {
        let mut rooms = self.rooms.write().expect("rooms lock poisoned");
        if let Some(room) = rooms.get_mut(room_id) {
            room.turn_state = Some(state.clone());
        }
        Ok(())
    }

    async fn get_turn_state(&self, room_id: &str) -> anyhow::Result<Option<TurnState>> {
        let rooms = self.rooms.read().expect("rooms lock poisoned");
        Ok(rooms.get(room_id).and_then(|r| r.turn_state.clone()))
    }

    async fn clear_turn_state(&self, room_id: &str) -> anyhow::Result<()> {
        let mut rooms = self.rooms.write().expect("rooms lock poisoned");
        if let Some(room) = rooms.get_mut(room_id) {
            room.turn_state = None;
            room.turn_order.clear();
            room.votes.clear();
        }
        Ok(())
    }

    async fn append_turn_word(&self, room_id: &str, entry: &TurnWordEntry) -> anyhow::Result<()> {
        let mut rooms = self.rooms.write().expect("rooms lock poisoned");
        if let Some(room) = rooms.get_mut(room_id) {
            room.turn_words.push(entry.clone());
        }
        Ok(())
    }

    async fn get_turn_words(&self, room_id: &str) -> anyhow::Result<Vec<TurnWordEntry>> {
        let rooms = self.rooms.read().expect("rooms lock poisoned");
        Ok(rooms
            .get(room_id)
            .map(|r| r.turn_words.clone())
            .unwrap_or_default())
    }

    async fn clear_turn_words(&self, room_id: &str) -> anyhow::Result<()> {
        let mut rooms = self.rooms.write().expect("rooms lock poisoned");
        if let Some(room) = rooms.get_mut(room_id) {
            room.turn_words.clear();
        }
        Ok(())
    }

    async fn append_word_history(&self, room_id: &str, entry: &TurnWordEntry) -> anyhow::Result<()> {
        let mut rooms = self.rooms.write().expect("rooms lock poisoned");
        if let Some(room) = rooms.get_mut(room_id) {
            room.word_history.push(entry.clone());
        }
        Ok(())
    }

    async fn get_word_history(&self, room_id: &str) -> anyhow::Result<Vec<TurnWordEntry>> {
        let rooms = self.rooms.read().expect("rooms lock poisoned");
        Ok(rooms
            .get(room_id)
            .map(|r| r.word_history.clone())
            .unwrap_or_default())
    }

    async fn clear_word_history(&self, room_id: &str) -> anyhow::Result<()> {
        let mut rooms = self.rooms.write().expect("rooms lock poisoned");
        if let Some(room) = rooms.get_mut(room_id) {
            room.word_history.clear();
        }
        Ok(())
    }

    async fn set_vote(&self, room_id: &str, voter: &str, target: &str) -> anyhow::Result<()> {
        let mut rooms = self.rooms.write().expect("rooms lock poisoned");
        if let Some(room) = rooms.get_mut(room_id) {
            room.votes.insert(voter.to_string(), target.to_string());
        }
        Ok(())
    }

    async fn get_votes(&self, room_id: &str) -> anyhow::Result<BTreeMap<ConnId, ConnId>> {
        let rooms = self.rooms.read().expect("rooms lock poisoned");
        Ok(rooms.get(room_id).map(|r| r.votes.clone()).unwrap_or_default())
    }

    async fn clear_votes(&self, room_id: &str) -> anyhow::Result<()> {
        let mut rooms = self.rooms.write().expect("rooms lock poisoned");
        if let Some(room) = rooms.get_mut(room_id) {
            room.votes.clear();
        }
        Ok(())
    }

    async fn issue_resume_token(&self, room_id: &str, conn_id: &str) -> anyhow::Result<String> {
        let conns = self.conns.read().expect("conns lock poisoned");
        let attrs = conns.get(conn_id).cloned().unwrap_or_default();
        drop(conns);

        let token = crate::domain::ids::generate_resume_token();
        let mut tokens = self.resume_tokens.write().expect("tokens lock poisoned");
        tokens.insert(
            token.clone(),
            ResumeSnapshot {
                room_id: room_id.to_string(),
                conn_id: conn_id.to_string(),
                nickname: attrs.nickname,
                ready: Some(attrs.ready),
                role: attrs.role,
            },
        );
        Ok(token)
    }

    async fn peek_resume_token(&self, token: &str) -> anyhow::Result<Option<ResumeSnapshot>> {
        let tokens = self.resume_tokens.read().expect("tokens lock poisoned");
        Ok(tokens.get(token).cloned())
    }

    async fn consume_resume_token(&self, token: &str) -> anyhow::Result<Option<ResumeSnapshot>> {
        let mut tokens = self.resume_tokens.write().expect("tokens lock poisoned");
        Ok(tokens.remove(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_room_then_add_conn_sets_host() {
        let store = InMemoryRoomStore::new();
        store.create_room("ROOM0001", "Test Room").await.unwrap();
        store
            .add_conn("ROOM0001", "conn-a", Some("Alice"), false)
            .await
            .unwrap();
        assert_eq!(store.get_host("ROOM0001").await.unwrap().as_deref(), Some("conn-a"));
    }

    #[tokio::test]
    async fn remove_host_reassigns_to_smallest_remaining() {
        let store = InMemoryRoomStore::new();
        store.create_room("ROOM0001", "Test Room").await.unwrap();
        store.add_conn("ROOM0001", "bbb", None, false).await.unwrap();
        store.add_conn("ROOM0001", "aaa", None, false).await.unwrap();
        store.remove_conn("ROOM0001", "bbb").await.unwrap();
        assert_eq!(store.get_host("ROOM0001").await.unwrap().as_deref(), Some("aaa"));
    }

    #[tokio::test]
    async fn remove_last_conn_clears_host() {
        let store = InMemoryRoomStore::new();
        store.create_room("ROOM0001", "Test Room").await.unwrap();
        store.add_conn("ROOM0001", "aaa", None, false).await.unwrap();
        store.remove_conn("ROOM0001", "aaa").await.unwrap();
        assert_eq!(store.get_host("ROOM0001").await.unwrap(), None);
    }

    #[tokio::test]
    async fn resume_token_is_single_use() {
        let store = InMemoryRoomStore::new();
        store.create_room("ROOM0001", "Test Room").await.unwrap();
        store
            .add_conn("ROOM0001", "aaa", Some("Alice"), true)
            .await
            .unwrap();
        let token = store.issue_resume_token("ROOM0001", "aaa").await.unwrap();
        let snapshot = store.consume_resume_token(&token).await.unwrap().unwrap();
        assert_eq!(snapshot.conn_id, "aaa");
        assert_eq!(snapshot.nickname.as_deref(), Some("Alice"));
        assert!(store.consume_resume_token(&token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn default_settings_match_spec() {
        let store = InMemoryRoomStore::new();
        store.create_room("ROOM0001", "Test Room").await.unwrap();
        let raw = store.get_room_settings_raw("ROOM0001").await.unwrap();
        let settings = Settings::from_raw(&raw);
        assert_eq!(settings, Settings::default());
    }
}
