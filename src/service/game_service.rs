//! `GameService` — the turn/vote state machine, per `spec.md` §4.4.
//!
//! The per-room mutex + single-slot timer registry is grounded in the
//! teacher's lazily-created-per-key lock registry shape (one `tokio::Mutex`
//! per key, guarded by a `std::sync::Mutex<HashMap<..>>`): here it
//! additionally carries an `AbortHandle` per room so starting a new timer
//! always cancels the previous one, satisfying "at most one active timer
//! task per room" (`spec.md` §3 invariant 7, §5).
//!
//! Every method that reads-then-writes turn state takes the room's
//! `tokio::Mutex` for its whole body; timer tasks take it only at the
//! transition point, never while sleeping, matching `spec.md` §5 exactly.
//! Because timer tasks must outlive the call that spawned them, every
//! method is defined on `Arc<GameService>` so a task can hold its own
//! clone of the service.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;
use tokio::task::AbortHandle;

use crate::domain::{
    now_ts, word_pool, ConnId, GameState, PlayerRole, RoomId, ServerEvent, ServiceError,
    ServiceResult, Settings, TurnPhase, TurnState, TurnWordEntry,
};
use crate::notify::Notifier;
use crate::store::RoomStore;

use super::AdvanceReason;

pub struct GameService {
    store: Arc<dyn RoomStore>,
    notifier: Arc<dyn Notifier>,
    timer_tick: Duration,
    room_locks: StdMutex<HashMap<RoomId, Arc<AsyncMutex<()>>>>,
    timers: StdMutex<HashMap<RoomId, AbortHandle>>,
}

impl GameService {
    /// Fails if `timer_tick` is not positive, per `spec.md` §5/§8.
    pub fn new(
        store: Arc<dyn RoomStore>,
        notifier: Arc<dyn Notifier>,
        timer_tick: Duration,
    ) -> anyhow::Result<Self> {
        anyhow::ensure!(!timer_tick.is_zero(), "timer_tick_seconds must be positive");
        Ok(Self {
            store,
            notifier,
            timer_tick,
            room_locks: StdMutex::new(HashMap::new()),
            timers: StdMutex::new(HashMap::new()),
        })
    }

    fn room_lock(&self, room_id: &str) -> Arc<AsyncMutex<()>> {
        self.room_locks
            .lock()
            .expect("room lock registry poisoned")
            .entry(room_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Cancels any previously running timer for this room and records the
    /// new handle. Only one timer task is ever live per room.
    fn arm_timer(&self, room_id: &str, handle: AbortHandle) {
        let previous = self
            .timers
            .lock()
            .expect("timer registry poisoned")
            .insert(room_id.to_string(), handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    fn cancel_timer(&self, room_id: &str) {
        if let Some(handle) = self.timers.lock().expect("timer registry poisoned").remove(room_id)
        {
            handle.abort();
        }
    }

    async fn require_room(&self, room_id: &str) -> ServiceResult<()> {
        self.store
            .get_room_name(room_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("room '{room_id}' not found")))?;
        Ok(())
    }

    async fn members(&self, room_id: &str) -> ServiceResult<Vec<ConnId>> {
        Ok(self.store.list_conns(room_id).await?.into_iter().collect())
    }

    async fn settings(&self, room_id: &str) -> ServiceResult<Settings> {
        let raw = self.store.get_room_settings_raw(room_id).await?;
        Ok(Settings::from_raw(&raw))
    }

    // -- 4.4.1 start_game -----------------------------------------------------

    #[tracing::instrument(skip(self))]
    pub async fn start_game(
        self: &Arc<Self>,
        room_id: &str,
        caller_conn_id: &str,
    ) -> ServiceResult<()> {
        let lock = self.room_lock(room_id);
        let _guard = lock.lock().await;
        self.require_room(room_id).await?;

        let host = self.store.get_host(room_id).await?;
        if host.as_deref() != Some(caller_conn_id) {
            return Err(ServiceError::Forbidden("only the host may start the game".into()));
        }

        let members = self.store.list_conns(room_id).await?;
        if members.is_empty() {
            return Err(ServiceError::Conflict("room has no players".into()));
        }
        for conn_id in &members {
            let attrs = self.store.get_conn(room_id, conn_id).await?;
            if !attrs.map(|a| a.ready).unwrap_or(false) {
                return Err(ServiceError::Conflict("not all players are ready".into()));
            }
        }

        self.store.clear_word_history(room_id).await?;
        self.store.set_game_state(room_id, GameState::InProgress).await?;
        self.assign_roles(room_id, &members).await?;

        let all: Vec<ConnId> = members.iter().cloned().collect();
        self.notifier
            .broadcast(&all, ServerEvent::GameStarted { room_id: room_id.to_string() }.to_json())
            .await;

        self.start_round_locked(room_id, 1, true).await?;
        Ok(())
    }

    async fn assign_roles(
        &self,
        room_id: &str,
        members: &BTreeSet<ConnId>,
    ) -> ServiceResult<()> {
        let sorted: Vec<ConnId> = members.iter().cloned().collect();
        let impostor = {
            use rand::RngExt;
            let mut rng = rand::rng();
            let idx = rng.random_range(0..sorted.len());
            sorted[idx].clone()
        };
        let word = word_pool::pick_secret_word();

        self.store.set_secret_word(room_id, word).await?;
        self.store.set_impostor(room_id, &impostor).await?;

        for conn_id in &sorted {
            let role = if *conn_id == impostor { PlayerRole::Impostor } else { PlayerRole::Crew };
            self.store.set_role(room_id, conn_id, role).await?;
            self.send_role(room_id, conn_id, role, word).await;
        }
        Ok(())
    }

    async fn send_role(&self, room_id: &str, conn_id: &str, role: PlayerRole, word: &str) {
        let event = match role {
            PlayerRole::Impostor => ServerEvent::Role {
                room_id: room_id.to_string(),
                role,
                message: Some("you are impostor".to_string()),
                word: None,
            },
            PlayerRole::Crew => ServerEvent::Role {
                room_id: room_id.to_string(),
                role,
                message: None,
                word: Some(word.to_string()),
            },
        };
        self.notifier.send_to_conn(conn_id, event.to_json()).await;
    }

    // -- 4.4.2 round/turn structure --------------------------------------------

    /// Caller must already hold the room lock.
    async fn start_round_locked(
        self: &Arc<Self>,
        room_id: &str,
        round: u32,
        first_round: bool,
    ) -> ServiceResult<()> {
        let order = if first_round {
            let mut order = self.members(room_id).await?;
            shuffle(&mut order);
            self.store.set_turn_order(room_id, order.clone()).await?;
            order
        } else {
            self.store.get_turn_order(room_id).await?
        };

        if order.is_empty() {
            return Err(ServiceError::Conflict("no players to assign a turn order".into()));
        }

        self.store.clear_turn_words(room_id).await?;

        let settings = self.settings(room_id).await?;
        let state = TurnState {
            phase: TurnPhase::Active,
            round,
            turn_index: 0,
            current_conn_id: order[0].clone(),
            turn_duration: settings.turn_duration,
            round_time: settings.round_time,
            turn_grace: settings.turn_grace,
            deadline_ts: Some(now_ts() + settings.turn_duration as f64),
            turn_remaining: None,
            grace_deadline_ts: None,
            vote_deadline_ts: None,
            voters: Vec::new(),
        };
        self.store.set_turn_state(room_id, &state).await?;

        let all = self.members(room_id).await?;
        self.notifier
            .broadcast(
                &all,
                ServerEvent::RoundStarted {
                    room_id: room_id.to_string(),
                    round,
                    order: order.clone(),
                    turn_duration: settings.turn_duration,
                }
                .to_json(),
            )
            .await;
        self.notifier
            .broadcast(
                &all,
                ServerEvent::TurnStarted {
                    room_id: room_id.to_string(),
                    round,
                    turn_index: 0,
                    conn_id: order[0].clone(),
                    turn_duration: settings.turn_duration,
                }
                .to_json(),
            )
            .await;

        self.spawn_turn_timer(room_id);
        Ok(())
    }

    /// Spawns the turn timer task. Re-reads state every tick and only
    /// touches the room lock at the decision point, never while sleeping.
    fn spawn_turn_timer(self: &Arc<Self>, room_id: &str) {
        let svc = Arc::clone(self);
        let room_id = room_id.to_string();
        let handle = tokio::spawn(async move {
            svc.turn_timer_loop(&room_id).await;
        });
        self.arm_timer(&room_id, handle.abort_handle());
    }

    async fn turn_timer_loop(self: Arc<Self>, room_id: &str) {
        loop {
            let lock = self.room_lock(room_id);
            let state = {
                let _guard = lock.lock().await;
                match self.store.get_turn_state(room_id).await {
                    Ok(Some(state)) => state,
                    _ => return,
                }
            };
            if state.phase != TurnPhase::Active {
                return;
            }
            let Some(deadline) = state.deadline_ts else { return };
            let remaining = (deadline - now_ts()).floor();
            if remaining <= 0.0 {
                let _guard = lock.lock().await;
                let _ = self.advance_turn_locked(room_id, AdvanceReason::Timeout).await;
                return;
            }
            let all = self.members(room_id).await.unwrap_or_default();
            self.notifier
                .broadcast(
                    &all,
                    ServerEvent::TurnTimer {
                        room_id: room_id.to_string(),
                        round: state.round,
                        turn_index: state.turn_index,
                        conn_id: state.current_conn_id.clone(),
                        remaining: remaining as u64,
                        phase: "active",
                    }
                    .to_json(),
                )
                .await;
            tokio::time::sleep(self.timer_tick).await;
        }
    }

    /// Caller must already hold the room lock.
    async fn advance_turn_locked(
        self: &Arc<Self>,
        room_id: &str,
        reason: AdvanceReason,
    ) -> ServiceResult<()> {
        let Some(state) = self.store.get_turn_state(room_id).await? else {
            return Ok(());
        };

        let all = self.members(room_id).await?;
        self.notifier
            .broadcast(
                &all,
                ServerEvent::TurnEnded {
                    room_id: room_id.to_string(),
                    round: state.round,
                    turn_index: state.turn_index,
                    conn_id: state.current_conn_id.clone(),
                    reason: reason.as_str(),
                }
                .to_json(),
            )
            .await;

        let order = self.store.get_turn_order(room_id).await?;
        let next = state.turn_index + 1;
        if next as usize >= order.len() {
            return self.start_voting_locked(room_id, state.round).await;
        }

        let settings = self.settings(room_id).await?;
        let next_state = TurnState {
            phase: TurnPhase::Active,
            round: state.round,
            turn_index: next,
            current_conn_id: order[next as usize].clone(),
            turn_duration: settings.turn_duration,
            round_time: settings.round_time,
            turn_grace: settings.turn_grace,
            deadline_ts: Some(now_ts() + settings.turn_duration as f64),
            turn_remaining: None,
            grace_deadline_ts: None,
            vote_deadline_ts: None,
            voters: Vec::new(),
        };
        self.store.set_turn_state(room_id, &next_state).await?;

        self.notifier
            .broadcast(
                &all,
                ServerEvent::TurnStarted {
                    room_id: room_id.to_string(),
                    round: next_state.round,
                    turn_index: next_state.turn_index,
                    conn_id: next_state.current_conn_id.clone(),
                    turn_duration: next_state.turn_duration,
                }
                .to_json(),
            )
            .await;

        self.spawn_turn_timer(room_id);
        Ok(())
    }

    // -- 4.4.3 per-turn operations ----------------------------------------------

    #[tracing::instrument(skip(self))]
    pub async fn submit_turn_word(
        self: &Arc<Self>,
        room_id: &str,
        conn_id: &str,
        word: &str,
    ) -> ServiceResult<serde_json::Value> {
        let lock = self.room_lock(room_id);
        let _guard = lock.lock().await;
        self.require_room(room_id).await?;

        let word = word.trim();
        if word.is_empty() {
            return Err(ServiceError::Validation("word must not be empty".into()));
        }

        let state = self
            .store
            .get_turn_state(room_id)
            .await?
            .ok_or_else(|| ServiceError::Conflict("no game in progress".into()))?;
        if state.phase != TurnPhase::Active {
            return Err(ServiceError::Conflict("it is not currently anyone's speaking turn".into()));
        }
        if state.current_conn_id != conn_id {
            return Err(ServiceError::Forbidden("it is not your turn".into()));
        }

        let entry = TurnWordEntry {
            word: word.to_string(),
            conn_id: conn_id.to_string(),
            round: state.round,
            turn_index: state.turn_index,
        };
        self.store.append_turn_word(room_id, &entry).await?;
        self.store.append_word_history(room_id, &entry).await?;

        let all = self.members(room_id).await?;
        self.notifier
            .broadcast(
                &all,
                ServerEvent::TurnWordSubmitted {
                    room_id: room_id.to_string(),
                    entry: entry.clone(),
                }
                .to_json(),
            )
            .await;

        self.advance_turn_locked(room_id, AdvanceReason::Spoken).await?;
        Ok(serde_json::json!({"word": entry.word, "round": entry.round, "turn_index": entry.turn_index}))
    }

    /// Called when the current speaker sends a plain chat frame: a no-op
    /// unless they are, in fact, the active speaker.
    #[tracing::instrument(skip(self))]
    pub async fn handle_turn_message(self: &Arc<Self>, room_id: &str, conn_id: &str) {
        let lock = self.room_lock(room_id);
        let _guard = lock.lock().await;
        let Ok(Some(state)) = self.store.get_turn_state(room_id).await else { return };
        if state.phase == TurnPhase::Active && state.current_conn_id == conn_id {
            let _ = self.advance_turn_locked(room_id, AdvanceReason::Spoken).await;
        }
    }

    // -- 4.4.4 voting phase -------------------------------------------------------

    /// Caller must already hold the room lock.
    async fn start_voting_locked(self: &Arc<Self>, room_id: &str, round: u32) -> ServiceResult<()> {
        let mut voters = self.members(room_id).await?;
        voters.sort();
        if voters.is_empty() {
            return Ok(());
        }

        let settings = self.settings(room_id).await?;
        let state = TurnState {
            phase: TurnPhase::Voting,
            round,
            turn_index: 0,
            current_conn_id: String::new(),
            turn_duration: settings.turn_duration,
            round_time: settings.round_time,
            turn_grace: settings.turn_grace,
            deadline_ts: None,
            turn_remaining: None,
            grace_deadline_ts: None,
            vote_deadline_ts: Some(now_ts() + settings.round_time as f64),
            voters: voters.clone(),
        };
        self.store.set_turn_state(room_id, &state).await?;
        self.store.clear_votes(room_id).await?;

        self.notifier
            .broadcast(
                &voters,
                ServerEvent::RoundEnded { room_id: room_id.to_string(), round }.to_json(),
            )
            .await;
        self.notifier
            .broadcast(
                &voters,
                ServerEvent::VotingStarted {
                    room_id: room_id.to_string(),
                    round,
                    voters: voters.clone(),
                    vote_duration: settings.round_time,
                }
                .to_json(),
            )
            .await;

        self.spawn_voting_timer(room_id);
        Ok(())
    }

    fn spawn_voting_timer(self: &Arc<Self>, room_id: &str) {
        let svc = Arc::clone(self);
        let room_id = room_id.to_string();
        let handle = tokio::spawn(async move {
            svc.voting_timer_loop(&room_id).await;
        });
        self.arm_timer(&room_id, handle.abort_handle());
    }

    async fn voting_timer_loop(self: Arc<Self>, room_id: &str) {
        loop {
            let lock = self.room_lock(room_id);
            let state = {
                let _guard = lock.lock().await;
                match self.store.get_turn_state(room_id).await {
                    Ok(Some(state)) => state,
                    _ => return,
                }
            };
            if state.phase != TurnPhase::Voting {
                return;
            }
            let Some(deadline) = state.vote_deadline_ts else { return };
            let remaining = (deadline - now_ts()).floor();
            if remaining <= 0.0 {
                let _guard = lock.lock().await;
                let _ = self.finalize_voting_locked(room_id).await;
                return;
            }
            self.notifier
                .broadcast(
                    &state.voters,
                    ServerEvent::TurnTimer {
                        room_id: room_id.to_string(),
                        round: state.round,
                        turn_index: 0,
                        conn_id: String::new(),
                        remaining: remaining as u64,
                        phase: "voting",
                    }
                    .to_json(),
                )
                .await;
            tokio::time::sleep(self.timer_tick).await;
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn cast_vote(
        self: &Arc<Self>,
        room_id: &str,
        voter: &str,
        target: &str,
    ) -> ServiceResult<serde_json::Value> {
        let lock = self.room_lock(room_id);
        let _guard = lock.lock().await;
        self.require_room(room_id).await?;

        let state = self
            .store
            .get_turn_state(room_id)
            .await?
            .ok_or_else(|| ServiceError::Conflict("no voting phase in progress".into()))?;
        if state.phase != TurnPhase::Voting {
            return Err(ServiceError::Conflict("no voting phase in progress".into()));
        }

        if let Some(deadline) = state.vote_deadline_ts {
            if now_ts() >= deadline {
                self.finalize_voting_locked(room_id).await?;
                return Err(ServiceError::Conflict("voting deadline has passed".into()));
            }
        }

        if !state.voters.iter().any(|v| v == voter) {
            return Err(ServiceError::Forbidden("caller is not an eligible voter".into()));
        }
        if target != "skip" && !state.voters.iter().any(|v| v == target) {
            return Err(ServiceError::Conflict("target is not an eligible vote target".into()));
        }

        let existing = self.store.get_votes(room_id).await?;
        if existing.contains_key(voter) {
            return Err(ServiceError::Conflict("this voter has already voted".into()));
        }

        self.store.set_vote(room_id, voter, target).await?;
        let votes = self.store.get_votes(room_id).await?;
        let tally = tally_votes(&votes);

        self.notifier
            .broadcast(
                &state.voters,
                ServerEvent::VoteCast {
                    room_id: room_id.to_string(),
                    voter: voter.to_string(),
                    target: target.to_string(),
                    votes: votes.clone(),
                    tally: tally.clone(),
                }
                .to_json(),
            )
            .await;

        if votes.len() >= state.voters.len() {
            self.finalize_voting_locked(room_id).await?;
        }

        Ok(serde_json::json!({"votes": votes, "tally": tally}))
    }

    /// Caller must already hold the room lock.
    async fn finalize_voting_locked(self: &Arc<Self>, room_id: &str) -> ServiceResult<()> {
        let Some(state) = self.store.get_turn_state(room_id).await? else {
            return Ok(());
        };
        if state.phase != TurnPhase::Voting {
            return Ok(());
        }

        let votes = self.store.get_votes(room_id).await?;
        let tally = tally_votes(&votes);
        let total = state.voters.len() as u32;
        let majority = total / 2 + 1;

        let voted_out = tally
            .iter()
            .find(|(target, count)| target.as_str() != "skip" && **count >= majority)
            .map(|(target, _)| target.clone());

        if let Some(voted_out) = voted_out {
            let impostor = self.store.get_impostor(room_id).await?;
            let crew_wins = impostor.as_deref() == Some(voted_out.as_str());
            let result = serde_json::json!({
                "voted_out": voted_out,
                "winner": if crew_wins { "crew" } else { "impostor" },
                "reason": "vote_out",
                "tally": tally,
                "votes": votes,
            });
            self.notifier
                .broadcast(
                    &state.voters,
                    ServerEvent::VotingResult {
                        room_id: room_id.to_string(),
                        result: result.clone(),
                    }
                    .to_json(),
                )
                .await;
            self.end_game_locked(room_id, Some(result)).await?;
        } else {
            let result = serde_json::json!({
                "winner": serde_json::Value::Null,
                "reason": "no_majority",
                "tally": tally,
                "votes": votes,
            });
            self.notifier
                .broadcast(
                    &state.voters,
                    ServerEvent::VotingResult {
                        room_id: room_id.to_string(),
                        result,
                    }
                    .to_json(),
                )
                .await;
            self.store.clear_votes(room_id).await?;
            self.start_round_locked(room_id, state.round + 1, false).await?;
        }

        Ok(())
    }

    // -- 4.4.5 impostor guess -----------------------------------------------------

    #[tracing::instrument(skip(self))]
    pub async fn guess_word(
        self: &Arc<Self>,
        room_id: &str,
        conn_id: &str,
        guess: &str,
    ) -> ServiceResult<serde_json::Value> {
        let lock = self.room_lock(room_id);
        let _guard = lock.lock().await;
        self.require_room(room_id).await?;

        let impostor = self.store.get_impostor(room_id).await?;
        if impostor.as_deref() != Some(conn_id) {
            return Err(ServiceError::Forbidden("only the impostor may guess the word".into()));
        }

        let guess = guess.trim();
        if guess.is_empty() {
            return Err(ServiceError::Validation("guess must not be empty".into()));
        }

        let word = self.store.get_secret_word(room_id).await?.unwrap_or_default();
        let matches = word_pool::normalize_word(guess) == word_pool::normalize_word(&word);

        let result = if matches {
            serde_json::json!({"winner": "impostor", "reason": "impostor_guessed", "guess": guess})
        } else {
            serde_json::json!({"winner": "crew", "reason": "impostor_failed_guess", "guess": guess})
        };

        self.end_game_locked(room_id, Some(result.clone())).await?;
        Ok(result)
    }

    // -- 4.4.6 disconnect / pause / reconnect --------------------------------------

    #[tracing::instrument(skip(self))]
    pub async fn handle_disconnect(self: &Arc<Self>, room_id: &str, conn_id: &str) {
        let lock = self.room_lock(room_id);
        let _guard = lock.lock().await;
        let Ok(Some(state)) = self.store.get_turn_state(room_id).await else { return };
        if state.phase != TurnPhase::Active || state.current_conn_id != conn_id {
            return;
        }

        let remaining = state.deadline_ts.map(|d| (d - now_ts()).max(0.0)).unwrap_or(0.0);
        let paused = TurnState {
            phase: TurnPhase::Paused,
            turn_remaining: Some(remaining as u64),
            grace_deadline_ts: Some(now_ts() + state.turn_grace as f64),
            deadline_ts: None,
            ..state
        };
        if self.store.set_turn_state(room_id, &paused).await.is_err() {
            return;
        }

        let all = self.members(room_id).await.unwrap_or_default();
        self.notifier
            .broadcast(
                &all,
                ServerEvent::TurnPaused {
                    room_id: room_id.to_string(),
                    conn_id: conn_id.to_string(),
                    remaining: paused.turn_grace,
                }
                .to_json(),
            )
            .await;

        self.spawn_grace_timer(room_id);
    }

    fn spawn_grace_timer(self: &Arc<Self>, room_id: &str) {
        let svc = Arc::clone(self);
        let room_id = room_id.to_string();
        let handle = tokio::spawn(async move {
            svc.grace_timer_loop(&room_id).await;
        });
        self.arm_timer(&room_id, handle.abort_handle());
    }

    async fn grace_timer_loop(self: Arc<Self>, room_id: &str) {
        loop {
            let lock = self.room_lock(room_id);
            let state = {
                let _guard = lock.lock().await;
                match self.store.get_turn_state(room_id).await {
                    Ok(Some(state)) => state,
                    _ => return,
                }
            };
            if state.phase != TurnPhase::Paused {
                return;
            }
            let Some(deadline) = state.grace_deadline_ts else { return };
            let remaining = (deadline - now_ts()).floor();
            if remaining <= 0.0 {
                let _guard = lock.lock().await;
                let _ = self.advance_turn_locked(room_id, AdvanceReason::Skipped).await;
                return;
            }
            let all = self.members(room_id).await.unwrap_or_default();
            self.notifier
                .broadcast(
                    &all,
                    ServerEvent::TurnTimer {
                        room_id: room_id.to_string(),
                        round: state.round,
                        turn_index: state.turn_index,
                        conn_id: state.current_conn_id.clone(),
                        remaining: remaining as u64,
                        phase: "grace",
                    }
                    .to_json(),
                )
                .await;
            tokio::time::sleep(self.timer_tick).await;
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn handle_reconnect(
        self: &Arc<Self>,
        room_id: &str,
        conn_id: &str,
        role: Option<PlayerRole>,
    ) {
        if let Some(role) = role {
            let word = self.store.get_secret_word(room_id).await.ok().flatten().unwrap_or_default();
            self.send_role(room_id, conn_id, role, &word).await;
        }

        let lock = self.room_lock(room_id);
        let _guard = lock.lock().await;
        let Ok(Some(state)) = self.store.get_turn_state(room_id).await else { return };
        if state.phase != TurnPhase::Paused || state.current_conn_id != conn_id {
            return;
        }

        let remaining = state.turn_remaining.unwrap_or(0);
        if remaining == 0 {
            let _ = self.advance_turn_locked(room_id, AdvanceReason::Skipped).await;
            return;
        }

        let resumed = TurnState {
            phase: TurnPhase::Active,
            deadline_ts: Some(now_ts() + remaining as f64),
            turn_remaining: None,
            grace_deadline_ts: None,
            ..state
        };
        if self.store.set_turn_state(room_id, &resumed).await.is_err() {
            return;
        }

        let all = self.members(room_id).await.unwrap_or_default();
        self.notifier
            .broadcast(
                &all,
                ServerEvent::TurnResumed {
                    room_id: room_id.to_string(),
                    conn_id: conn_id.to_string(),
                    remaining,
                }
                .to_json(),
            )
            .await;

        self.spawn_turn_timer(room_id);
    }

    // -- 4.4.7 end game -------------------------------------------------------------

    /// Caller must already hold the room lock.
    async fn end_game_locked(
        self: &Arc<Self>,
        room_id: &str,
        result: Option<serde_json::Value>,
    ) -> ServiceResult<serde_json::Value> {
        let result = self.store.end_game(room_id, result).await?;

        let all = self.members(room_id).await?;
        self.notifier
            .broadcast(
                &all,
                ServerEvent::GameEnded { room_id: room_id.to_string(), result: result.clone() }.to_json(),
            )
            .await;

        for conn_id in &all {
            self.store.set_ready(room_id, conn_id, false).await?;
        }
        if let Some(lobby) = self.store.get_lobby_state(room_id).await? {
            self.notifier.broadcast(&all, ServerEvent::LobbyState(lobby).to_json()).await;
        }

        self.store.clear_roles(room_id).await?;
        self.store.clear_turn_state(room_id).await?;
        self.store.clear_turn_words(room_id).await?;
        self.store.clear_word_history(room_id).await?;

        self.cancel_timer(room_id);
        Ok(result)
    }

    /// Force-ends a game in progress, e.g. via the `/rooms/{room_id}/end`
    /// transport endpoint. A no-op result default applies if `result` is
    /// omitted, per `RoomStore::end_game`.
    #[tracing::instrument(skip(self))]
    pub async fn end_game(
        self: &Arc<Self>,
        room_id: &str,
        result: Option<serde_json::Value>,
    ) -> ServiceResult<serde_json::Value> {
        let lock = self.room_lock(room_id);
        let _guard = lock.lock().await;
        self.require_room(room_id).await?;
        self.end_game_locked(room_id, result).await
    }

    // -- 4.4.8 snapshot ---------------------------------------------------------

    #[tracing::instrument(skip(self))]
    pub async fn get_turn_snapshot(&self, room_id: &str) -> ServiceResult<Option<serde_json::Value>> {
        let Some(state) = self.store.get_turn_state(room_id).await? else {
            return Ok(None);
        };

        let mut snapshot = serde_json::to_value(&state).expect("TurnState always serializes");
        let order = self.store.get_turn_order(room_id).await?;
        let words = self.store.get_turn_words(room_id).await?;
        let history = self.store.get_word_history(room_id).await?;

        let remaining = match state.phase {
            TurnPhase::Active => state.deadline_ts.map(|d| (d - now_ts()).max(0.0).floor() as u64),
            TurnPhase::Paused => state.turn_remaining,
            TurnPhase::Voting => state.vote_deadline_ts.map(|d| (d - now_ts()).max(0.0).floor() as u64),
        };

        if let Some(obj) = snapshot.as_object_mut() {
            obj.insert("order".into(), serde_json::to_value(order).unwrap());
            obj.insert("words".into(), serde_json::to_value(words).unwrap());
            obj.insert("history".into(), serde_json::to_value(history).unwrap());
            obj.insert("remaining".into(), serde_json::to_value(remaining).unwrap());

            if state.phase == TurnPhase::Voting {
                let votes = self.store.get_votes(room_id).await?;
                let tally = tally_votes(&votes);
                obj.insert("voters".into(), serde_json::to_value(&state.voters).unwrap());
                obj.insert("votes".into(), serde_json::to_value(votes).unwrap());
                obj.insert("tally".into(), serde_json::to_value(tally).unwrap());
            }
        }

        Ok(Some(snapshot))
    }
}

fn tally_votes(votes: &BTreeMap<ConnId, ConnId>) -> BTreeMap<ConnId, u32> {
    let mut tally: BTreeMap<ConnId, u32> = BTreeMap::new();
    for target in votes.values() {
        *tally.entry(target.clone()).or_insert(0) += 1;
    }
    tally
}

fn shuffle(items: &mut [ConnId]) {
    use rand::RngExt;
    let mut rng = rand::rng();
    for i in (1..items.len()).rev() {
        let j = rng.random_range(0..=i);
        items.swap(i, j);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::InMemoryNotifier;
    use crate::store::InMemoryRoomStore;

    async fn ready_room(players: &[&str]) -> (Arc<GameService>, String) {
        let store: Arc<dyn RoomStore> = Arc::new(InMemoryRoomStore::new());
        let notifier: Arc<dyn Notifier> = Arc::new(InMemoryNotifier::new());
        let svc = Arc::new(GameService::new(store.clone(), notifier, Duration::from_millis(50)).unwrap());

        let room_id = "TESTROOM".to_string();
        store.create_room(&room_id, "Test Room").await.unwrap();
        for p in players {
            store.add_conn(&room_id, p, Some(p), true).await.unwrap();
        }
        (svc, room_id)
    }

    #[tokio::test]
    async fn start_game_requires_host() {
        let (svc, room_id) = ready_room(&["a", "b"]).await;
        let err = svc.start_game(&room_id, "b").await.unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }

    #[tokio::test]
    async fn start_game_requires_all_ready() {
        let store: Arc<dyn RoomStore> = Arc::new(InMemoryRoomStore::new());
        let notifier: Arc<dyn Notifier> = Arc::new(InMemoryNotifier::new());
        let svc = Arc::new(GameService::new(store.clone(), notifier, Duration::from_millis(50)).unwrap());
        let room_id = "TESTROOM".to_string();
        store.create_room(&room_id, "Test Room").await.unwrap();
        store.add_conn(&room_id, "a", Some("A"), true).await.unwrap();
        store.add_conn(&room_id, "b", Some("B"), false).await.unwrap();

        let err = svc.start_game(&room_id, "a").await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn start_game_assigns_exactly_one_impostor() {
        let (svc, room_id) = ready_room(&["a", "b", "c"]).await;
        svc.start_game(&room_id, "a").await.unwrap();

        let impostor = svc.store.get_impostor(&room_id).await.unwrap();
        assert!(impostor.is_some());
        assert!(["a", "b", "c"].contains(&impostor.as_deref().unwrap()));

        let state = svc.store.get_turn_state(&room_id).await.unwrap().unwrap();
        assert_eq!(state.phase, TurnPhase::Active);
        assert_eq!(state.round, 1);
        assert_eq!(state.turn_index, 0);

        svc.cancel_timer(&room_id);
    }

    #[tokio::test]
    async fn guess_word_matches_case_and_whitespace_insensitively() {
        let (svc, room_id) = ready_room(&["a", "b"]).await;
        svc.start_game(&room_id, "a").await.unwrap();
        svc.cancel_timer(&room_id);

        let impostor = svc.store.get_impostor(&room_id).await.unwrap().unwrap();
        svc.store.set_secret_word(&room_id, "Banana").await.unwrap();

        let result = svc.guess_word(&room_id, &impostor, "  banana ").await.unwrap();
        assert_eq!(result["winner"], "impostor");
        assert_eq!(result["reason"], "impostor_guessed");
    }

    #[tokio::test]
    async fn guess_word_forbidden_for_non_impostor() {
        let (svc, room_id) = ready_room(&["a", "b"]).await;
        svc.start_game(&room_id, "a").await.unwrap();
        svc.cancel_timer(&room_id);

        let impostor = svc.store.get_impostor(&room_id).await.unwrap().unwrap();
        let crew = if impostor == "a" { "b" } else { "a" };

        let err = svc.guess_word(&room_id, crew, "anything").await.unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }

    #[tokio::test]
    async fn cast_vote_rejects_double_voting() {
        let (svc, room_id) = ready_room(&["a", "b", "c"]).await;
        svc.start_game(&room_id, "a").await.unwrap();
        svc.cancel_timer(&room_id);

        // Force straight into voting by draining the turn order.
        for _ in 0..3 {
            let lock = svc.room_lock(&room_id);
            let _guard = lock.lock().await;
            svc.advance_turn_locked(&room_id, AdvanceReason::Spoken).await.unwrap();
        }
        svc.cancel_timer(&room_id);

        let state = svc.store.get_turn_state(&room_id).await.unwrap().unwrap();
        assert_eq!(state.phase, TurnPhase::Voting);

        svc.cast_vote(&room_id, "a", "b").await.unwrap();
        let err = svc.cast_vote(&room_id, "a", "c").await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn voting_majority_ends_game_and_resets_ready() {
        let (svc, room_id) = ready_room(&["a", "b", "c"]).await;
        svc.start_game(&room_id, "a").await.unwrap();
        svc.cancel_timer(&room_id);

        for _ in 0..3 {
            let lock = svc.room_lock(&room_id);
            let _guard = lock.lock().await;
            svc.advance_turn_locked(&room_id, AdvanceReason::Spoken).await.unwrap();
        }
        svc.cancel_timer(&room_id);

        svc.cast_vote(&room_id, "a", "b").await.unwrap();
        svc.cast_vote(&room_id, "c", "b").await.unwrap();
        svc.cast_vote(&room_id, "b", "a").await.unwrap();

        // All three voters have now voted; finalize happens automatically.
        assert!(svc.store.get_turn_state(&room_id).await.unwrap().is_none());
        assert_eq!(svc.store.get_game_state(&room_id).await.unwrap(), Some(GameState::Ended));
        for conn_id in ["a", "b", "c"] {
            let attrs = svc.store.get_conn(&room_id, conn_id).await.unwrap().unwrap();
            assert!(!attrs.ready);
        }
    }

    #[tokio::test]
    async fn no_majority_clears_votes_and_starts_next_round() {
        let (svc, room_id) = ready_room(&["a", "b", "c", "d"]).await;
        svc.start_game(&room_id, "a").await.unwrap();
        svc.cancel_timer(&room_id);

        for _ in 0..4 {
            let lock = svc.room_lock(&room_id);
            let _guard = lock.lock().await;
            svc.advance_turn_locked(&room_id, AdvanceReason::Spoken).await.unwrap();
        }
        svc.cancel_timer(&room_id);

        svc.cast_vote(&room_id, "a", "b").await.unwrap();
        svc.cast_vote(&room_id, "b", "c").await.unwrap();
        svc.cast_vote(&room_id, "c", "skip").await.unwrap();
        svc.cast_vote(&room_id, "d", "skip").await.unwrap();

        let state = svc.store.get_turn_state(&room_id).await.unwrap().unwrap();
        assert_eq!(state.phase, TurnPhase::Active);
        assert_eq!(state.round, 2);
        svc.cancel_timer(&room_id);
    }

    #[tokio::test]
    async fn empty_voters_at_voting_entry_is_a_no_op() {
        let (svc, room_id) = ready_room(&["a"]).await;
        svc.start_game(&room_id, "a").await.unwrap();
        svc.cancel_timer(&room_id);

        svc.store.remove_conn(&room_id, "a").await.unwrap();
        let lock = svc.room_lock(&room_id);
        let _guard = lock.lock().await;
        svc.start_voting_locked(&room_id, 1).await.unwrap();
    }

    #[tokio::test]
    async fn disconnect_pauses_active_speaker_then_reconnect_resumes() {
        let (svc, room_id) = ready_room(&["a", "b"]).await;
        svc.start_game(&room_id, "a").await.unwrap();
        svc.cancel_timer(&room_id);

        let state = svc.store.get_turn_state(&room_id).await.unwrap().unwrap();
        let speaker = state.current_conn_id.clone();

        svc.handle_disconnect(&room_id, &speaker).await;
        let paused = svc.store.get_turn_state(&room_id).await.unwrap().unwrap();
        assert_eq!(paused.phase, TurnPhase::Paused);
        svc.cancel_timer(&room_id);

        svc.handle_reconnect(&room_id, &speaker, None).await;
        let resumed = svc.store.get_turn_state(&room_id).await.unwrap().unwrap();
        assert_eq!(resumed.phase, TurnPhase::Active);
        svc.cancel_timer(&room_id);
    }

    #[tokio::test]
    async fn zero_turn_remaining_on_reconnect_skips_the_turn() {
        let (svc, room_id) = ready_room(&["a", "b", "c"]).await;
        svc.start_game(&room_id, "a").await.unwrap();
        svc.cancel_timer(&room_id);

        let state = svc.store.get_turn_state(&room_id).await.unwrap().unwrap();
        let speaker = state.current_conn_id.clone();

        let paused = TurnState {
            phase: TurnPhase::Paused,
            turn_remaining: Some(0),
            grace_deadline_ts: Some(now_ts() + 60.0),
            deadline_ts: None,
            ..state
        };
        svc.store.set_turn_state(&room_id, &paused).await.unwrap();

        svc.handle_reconnect(&room_id, &speaker, None).await;
        let after = svc.store.get_turn_state(&room_id).await.unwrap().unwrap();
        assert_ne!(after.current_conn_id, speaker);
        svc.cancel_timer(&room_id);
    }
}
