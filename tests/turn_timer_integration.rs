//! End-to-end turn-timer and impostor-guess scenarios, exercised through
//! `RoomService`/`GameService` against the in-memory store with the real
//! `tokio::time::sleep`-driven timer tasks running (no manual advance).

use std::sync::Arc;
use std::time::Duration;

use impostor_server::notify::InMemoryNotifier;
use impostor_server::service::{GameService, RoomService};
use impostor_server::store::{InMemoryRoomStore, RoomStore};

async fn setup(turn_duration: u64) -> (RoomService, Arc<GameService>, Arc<dyn RoomStore>, String) {
    let store: Arc<dyn RoomStore> = Arc::new(InMemoryRoomStore::new());
    let notifier = Arc::new(InMemoryNotifier::new());
    let room_service = RoomService::new(store.clone(), notifier.clone());
    let game_service =
        Arc::new(GameService::new(store.clone(), notifier, Duration::from_secs(1)).unwrap());

    let (room_id, _) = room_service.create_room("Test Room").await.unwrap();
    for (id, nick) in [("a", "A"), ("b", "B"), ("c", "C")] {
        room_service.join_room(&room_id, id, Some(nick)).await.unwrap();
        room_service.set_ready(&room_id, id, true).await.unwrap();
    }
    // `a` becomes host on first join, so settings can only be changed after.
    room_service.update_settings(&room_id, "a", None, Some(turn_duration), None).await.unwrap();

    (room_service, game_service, store, room_id)
}

/// Scenario 3: with no `submit_turn_word`, turns time out in order and the
/// round ends into a voting phase once every player has spoken.
#[tokio::test]
async fn turns_time_out_in_order_then_enter_voting() {
    let (room_service, game_service, _store, room_id) = setup(1).await;
    game_service.start_game(&room_id, "a").await.unwrap();

    // Each turn lasts ~1s with a 1s tick; give each transition headroom.
    tokio::time::sleep(Duration::from_millis(1500)).await;
    let after_first = game_service.get_turn_snapshot(&room_id).await.unwrap().unwrap();
    assert_eq!(after_first["turn_index"], 1);

    tokio::time::sleep(Duration::from_millis(1500)).await;
    let after_second = game_service.get_turn_snapshot(&room_id).await.unwrap().unwrap();
    assert_eq!(after_second["turn_index"], 2);

    tokio::time::sleep(Duration::from_millis(1500)).await;
    let snapshot = game_service.get_turn_snapshot(&room_id).await.unwrap().unwrap();
    assert_eq!(snapshot["phase"], "voting");

    let lobby = room_service.get_lobby(&room_id).await.unwrap();
    assert_eq!(lobby.players.len(), 3);
}

/// Scenario 6: impostor guesses the secret word correctly or incorrectly.
#[tokio::test]
async fn impostor_guess_matches_spec_examples() {
    let (_room_service, game_service, store, room_id) = setup(30).await;
    game_service.start_game(&room_id, "a").await.unwrap();

    let impostor = store.get_impostor(&room_id).await.unwrap().unwrap();
    store.set_secret_word(&room_id, "Banana").await.unwrap();

    let result = game_service.guess_word(&room_id, &impostor, "banana").await.unwrap();
    assert_eq!(result["winner"], "impostor");
    assert_eq!(result["reason"], "impostor_guessed");
    assert!(game_service.get_turn_snapshot(&room_id).await.unwrap().is_none());
}

#[tokio::test]
async fn impostor_wrong_guess_hands_crew_the_win() {
    let (_room_service, game_service, store, room_id) = setup(30).await;
    game_service.start_game(&room_id, "a").await.unwrap();

    let impostor = store.get_impostor(&room_id).await.unwrap().unwrap();
    store.set_secret_word(&room_id, "Banana").await.unwrap();

    let result = game_service.guess_word(&room_id, &impostor, "apple").await.unwrap();
    assert_eq!(result["winner"], "crew");
    assert_eq!(result["reason"], "impostor_failed_guess");
}

/// Disconnect during an active turn pauses it; reconnecting within the
/// grace window resumes, matching scenario 5.
#[tokio::test]
async fn disconnect_during_turn_pauses_and_reconnect_resumes() {
    let (_room_service, game_service, _store, room_id) = setup(30).await;
    game_service.start_game(&room_id, "a").await.unwrap();

    let state = game_service.get_turn_snapshot(&room_id).await.unwrap().unwrap();
    let speaker = state["current_conn_id"].as_str().unwrap().to_string();

    game_service.handle_disconnect(&room_id, &speaker).await;
    let paused = game_service.get_turn_snapshot(&room_id).await.unwrap().unwrap();
    assert_eq!(paused["phase"], "paused");

    game_service.handle_reconnect(&room_id, &speaker, None).await;
    let resumed = game_service.get_turn_snapshot(&room_id).await.unwrap().unwrap();
    assert_eq!(resumed["phase"], "active");
}
