//! `RoomService` — lobby-level operations, per `spec.md` §4.3.
//!
//! Shape grounded in the teacher's `EnhancedGameServer::handle_join_room` /
//! `leave_room` (`server/room_service.rs`): validate, mutate the store,
//! then notify — `tracing` spans wrap each operation the same way.

use std::sync::Arc;

use crate::domain::{
    ids, validation, ConnId, LobbyState, PlayerRole, ResumeSnapshot, RoomId, ServerEvent,
    ServiceError, ServiceResult,
};
use crate::notify::Notifier;
use crate::store::RoomStore;

pub struct RoomService {
    store: Arc<dyn RoomStore>,
    notifier: Arc<dyn Notifier>,
}

impl RoomService {
    #[must_use]
    pub fn new(store: Arc<dyn RoomStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    async fn require_room_name(&self, room_id: &str) -> ServiceResult<String> {
        self.store
            .get_room_name(room_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("room '{room_id}' not found")))
    }

    async fn lobby_state(&self, room_id: &str) -> ServiceResult<LobbyState> {
        self.store
            .get_lobby_state(room_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("room '{room_id}' not found")))
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_lobby(&self, room_id: &str) -> ServiceResult<LobbyState> {
        self.lobby_state(room_id).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn create_room(&self, name: &str) -> ServiceResult<(RoomId, String)> {
        validation::validate_room_name(name)?;
        let room_id = ids::generate_room_id();
        self.store.create_room(&room_id, name).await?;
        tracing::info!(room_id, "room created");
        Ok((room_id, name.to_string()))
    }

    #[tracing::instrument(skip(self))]
    pub async fn join_room(
        &self,
        room_id: &str,
        conn_id: &str,
        nickname: Option<&str>,
    ) -> ServiceResult<LobbyState> {
        self.require_room_name(room_id).await?;
        if let Some(nick) = nickname {
            validation::validate_nickname(nick)?;
        }

        let lobby = self.lobby_state(room_id).await?;
        if lobby.players.len() as u32 >= lobby.settings.max_players {
            return Err(ServiceError::Conflict(format!(
                "room '{room_id}' is full ({} players)",
                lobby.settings.max_players
            )));
        }

        self.store.add_conn(room_id, conn_id, nickname, false).await?;
        let updated = self.lobby_state(room_id).await?;

        self.notifier
            .broadcast(
                &other_members(&updated, conn_id),
                ServerEvent::UserJoined {
                    room_id: room_id.to_string(),
                    conn_id: conn_id.to_string(),
                    nickname: nickname.map(str::to_string),
                }
                .to_json(),
            )
            .await;
        tracing::info!(room_id, conn_id, "conn joined room");
        Ok(updated)
    }

    #[tracing::instrument(skip(self))]
    pub async fn leave_room(&self, room_id: &str, conn_id: &str) -> ServiceResult<()> {
        self.require_room_name(room_id).await?;
        self.store.remove_conn(room_id, conn_id).await?;
        if let Ok(Some(lobby)) = self.store.get_lobby_state(room_id).await {
            self.notifier
                .broadcast(
                    &lobby.players.keys().cloned().collect::<Vec<_>>(),
                    ServerEvent::UserLeft {
                        room_id: room_id.to_string(),
                        conn_id: conn_id.to_string(),
                    }
                    .to_json(),
                )
                .await;
        }
        tracing::info!(room_id, conn_id, "conn left room");
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub async fn set_ready(
        &self,
        room_id: &str,
        conn_id: &str,
        ready: bool,
    ) -> ServiceResult<LobbyState> {
        self.require_room_name(room_id).await?;
        self.store.set_ready(room_id, conn_id, ready).await?;
        self.lobby_state(room_id).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn set_nickname(
        &self,
        room_id: &str,
        caller_conn_id: &str,
        target_conn_id: &str,
        nickname: &str,
    ) -> ServiceResult<LobbyState> {
        self.require_room_name(room_id).await?;
        validation::validate_nickname(nickname)?;

        if caller_conn_id != target_conn_id {
            let host = self.store.get_host(room_id).await?;
            if host.as_deref() != Some(caller_conn_id) {
                return Err(ServiceError::Forbidden(
                    "only the host may rename other players".into(),
                ));
            }
        }

        self.store.set_nickname(room_id, target_conn_id, nickname).await?;
        let lobby = self.lobby_state(room_id).await?;
        self.notifier
            .broadcast(
                &lobby.players.keys().cloned().collect::<Vec<_>>(),
                ServerEvent::UserRenamed {
                    room_id: room_id.to_string(),
                    conn_id: target_conn_id.to_string(),
                    nickname: nickname.to_string(),
                }
                .to_json(),
            )
            .await;
        Ok(lobby)
    }

    #[tracing::instrument(skip(self))]
    pub async fn update_settings(
        &self,
        room_id: &str,
        caller_conn_id: &str,
        max_players: Option<u32>,
        turn_duration: Option<u64>,
        round_time: Option<u64>,
    ) -> ServiceResult<LobbyState> {
        self.require_room_name(room_id).await?;
        let host = self.store.get_host(room_id).await?;
        if host.as_deref() != Some(caller_conn_id) {
            return Err(ServiceError::Forbidden("only the host may change settings".into()));
        }

        let state = self.store.get_game_state(room_id).await?;
        if state != Some(crate::domain::GameState::Lobby) {
            return Err(ServiceError::Conflict(
                "settings can only change while the room is in the lobby".into(),
            ));
        }

        let raw = validation::validate_settings_partial(max_players, turn_duration, round_time)?;
        self.store.set_room_settings_raw(room_id, raw).await?;
        self.lobby_state(room_id).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn kick_player(
        &self,
        room_id: &str,
        caller_conn_id: &str,
        target_conn_id: &str,
    ) -> ServiceResult<LobbyState> {
        self.require_room_name(room_id).await?;
        let host = self.store.get_host(room_id).await?;
        if host.as_deref() != Some(caller_conn_id) {
            return Err(ServiceError::Forbidden("only the host may kick players".into()));
        }
        if host.as_deref() == Some(target_conn_id) {
            return Err(ServiceError::Forbidden("the host cannot kick themself".into()));
        }

        self.store.remove_conn(room_id, target_conn_id).await?;
        let lobby = self.lobby_state(room_id).await?;
        self.notifier
            .send_to_conn(
                target_conn_id,
                ServerEvent::Kicked {
                    room_id: room_id.to_string(),
                    conn_id: target_conn_id.to_string(),
                }
                .to_json(),
            )
            .await;
        self.notifier.close_conn(target_conn_id).await;
        self.notifier
            .broadcast(
                &lobby.players.keys().cloned().collect::<Vec<_>>(),
                ServerEvent::UserLeft {
                    room_id: room_id.to_string(),
                    conn_id: target_conn_id.to_string(),
                }
                .to_json(),
            )
            .await;
        Ok(lobby)
    }

    /// Issues a resume token, then removes the conn — in that order, so the
    /// token snapshot captures the still-present conn attributes.
    #[tracing::instrument(skip(self))]
    pub async fn disconnect(&self, room_id: &str, conn_id: &str) -> ServiceResult<String> {
        self.require_room_name(room_id).await?;
        let token = self.store.issue_resume_token(room_id, conn_id).await?;
        self.store.remove_conn(room_id, conn_id).await?;
        Ok(token)
    }

    #[tracing::instrument(skip(self))]
    pub async fn preview_reconnect(&self, token: &str) -> ServiceResult<ResumeSnapshot> {
        let snapshot = self
            .store
            .peek_resume_token(token)
            .await?
            .ok_or_else(|| ServiceError::NotFound("resume token not found".into()))?;

        if self.store.get_room_name(&snapshot.room_id).await?.is_none() {
            return Err(ServiceError::NotFound(format!(
                "room '{}' no longer exists",
                snapshot.room_id
            )));
        }

        Ok(snapshot)
    }

    #[tracing::instrument(skip(self))]
    pub async fn reconnect(&self, token: &str) -> ServiceResult<(ResumeSnapshot, LobbyState)> {
        let snapshot = self
            .store
            .consume_resume_token(token)
            .await?
            .ok_or_else(|| ServiceError::NotFound("resume token not found".into()))?;

        if self.store.get_room_name(&snapshot.room_id).await?.is_none() {
            return Err(ServiceError::NotFound(format!(
                "room '{}' no longer exists",
                snapshot.room_id
            )));
        }

        self.store
            .add_conn(
                &snapshot.room_id,
                &snapshot.conn_id,
                snapshot.nickname.as_deref(),
                snapshot.ready.unwrap_or(false),
            )
            .await?;
        if let Some(role) = snapshot.role {
            self.store.set_role(&snapshot.room_id, &snapshot.conn_id, role).await?;
        }

        let lobby = self.lobby_state(&snapshot.room_id).await?;
        Ok((snapshot, lobby))
    }
}

fn other_members(lobby: &LobbyState, exclude: &str) -> Vec<ConnId> {
    lobby
        .players
        .keys()
        .filter(|id| id.as_str() != exclude)
        .cloned()
        .collect()
}

#[allow(dead_code)]
fn assert_role_is_send(_: PlayerRole) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::InMemoryNotifier;
    use crate::store::InMemoryRoomStore;

    fn service() -> RoomService {
        RoomService::new(
            Arc::new(InMemoryRoomStore::new()),
            Arc::new(InMemoryNotifier::new()),
        )
    }

    #[tokio::test]
    async fn create_room_returns_8_char_id_and_default_settings() {
        let svc = service();
        let (room_id, name) = svc.create_room("Test Room").await.unwrap();
        assert_eq!(room_id.len(), 8);
        assert_eq!(name, "Test Room");
        let lobby = svc.lobby_state(&room_id).await.unwrap();
        assert_eq!(lobby.host, None);
        assert!(lobby.players.is_empty());
        assert_eq!(lobby.settings.round_time, 60);
        assert_eq!(lobby.settings.max_players, 8);
        assert_eq!(lobby.settings.turn_duration, 30);
    }

    #[tokio::test]
    async fn join_room_enforces_max_players() {
        let svc = service();
        let (room_id, _) = svc.create_room("Room").await.unwrap();
        svc.update_settings(&room_id, "host-not-yet-set", None, None, None)
            .await
            .unwrap_err();
        svc.join_room(&room_id, "a", Some("A")).await.unwrap();
        svc.update_settings(&room_id, "a", Some(2), None, None).await.unwrap();
        svc.join_room(&room_id, "b", Some("B")).await.unwrap();
        let err = svc.join_room(&room_id, "c", Some("C")).await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn only_host_can_rename_others() {
        let svc = service();
        let (room_id, _) = svc.create_room("Room").await.unwrap();
        svc.join_room(&room_id, "host", Some("Host")).await.unwrap();
        svc.join_room(&room_id, "p2", Some("P2")).await.unwrap();

        let err = svc.set_nickname(&room_id, "p2", "host", "New").await.unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));

        svc.set_nickname(&room_id, "p2", "p2", "Renamed").await.unwrap();
        svc.set_nickname(&room_id, "host", "p2", "RenamedAgain").await.unwrap();
    }

    #[tokio::test]
    async fn disconnect_then_reconnect_restores_conn() {
        let svc = service();
        let (room_id, _) = svc.create_room("Room").await.unwrap();
        svc.join_room(&room_id, "a", Some("Alice")).await.unwrap();
        svc.set_ready(&room_id, "a", true).await.unwrap();

        let token = svc.disconnect(&room_id, "a").await.unwrap();
        assert!(svc.lobby_state(&room_id).await.unwrap().players.is_empty());

        let (snapshot, lobby) = svc.reconnect(&token).await.unwrap();
        assert_eq!(snapshot.conn_id, "a");
        assert_eq!(snapshot.nickname.as_deref(), Some("Alice"));
        assert_eq!(snapshot.ready, Some(true));
        assert!(lobby.players.contains_key("a"));

        let err = svc.reconnect(&token).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }
}
