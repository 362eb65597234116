//! Integration tests for the request dispatcher.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use dungeon_core::destination::Destination;
use dungeon_core::error::GameError;
use dungeon_core::voice::VoiceConnection;
use dungeon_dispatch::{Dispatcher, DispatcherConfig, DispatcherParts};
use dungeon_session::domain::state_machine::StorySettings;
use dungeon_test_support::{
    EngineCall, FakeSynthesizer, FakeVoiceConnection, FixedClock, InMemoryStoryRepository,
    RecordingOutbox, ScriptedEngine,
};
use dungeon_voice::VoiceOutputManager;

struct Harness {
    dispatcher: Dispatcher,
    engine: Arc<ScriptedEngine>,
    outbox: Arc<RecordingOutbox>,
    repository: Arc<InMemoryStoryRepository>,
}

fn config() -> DispatcherConfig {
    DispatcherConfig {
        generation_timeout: Duration::from_secs(5),
        story: StorySettings {
            context: "You are a detective.".into(),
            ..StorySettings::default()
        },
    }
}

fn harness_with(
    config: DispatcherConfig,
    engine: ScriptedEngine,
    voice: Option<Arc<VoiceOutputManager>>,
) -> Harness {
    let engine = Arc::new(engine);
    let outbox = Arc::new(RecordingOutbox::new());
    let repository = Arc::new(InMemoryStoryRepository::new());
    let clock = FixedClock::standard();
    let (dispatcher, _worker) = Dispatcher::spawn(
        config,
        DispatcherParts {
            engine: engine.clone(),
            outbox: outbox.clone(),
            repository: repository.clone(),
            voice,
            clock: Arc::new(clock),
        },
    );
    Harness {
        dispatcher,
        engine,
        outbox,
        repository,
    }
}

fn harness(engine: ScriptedEngine) -> Harness {
    harness_with(config(), engine, None)
}

fn room(id: &str) -> Destination {
    Destination::new(id)
}

#[tokio::test]
async fn test_first_action_starts_story_then_act_then_revert() {
    // Arrange
    let h = harness(ScriptedEngine::new());
    let room_a = room("room-a");

    // Act: first submit starts the story.
    h.dispatcher.submit(room_a.clone(), "look around").unwrap();
    h.dispatcher.drain().await;

    // Assert
    let view = h.dispatcher.session_view().unwrap();
    assert_eq!(view.results.len(), 1);
    assert!(matches!(h.engine.calls()[0], EngineCall::Start { .. }));
    let delivered = h.outbox.messages_for(&room_a);
    assert_eq!(delivered, vec!["> look around\nresult 1".to_owned()]);

    // Act: second submit continues it.
    h.dispatcher.submit(room_a.clone(), "open the door").unwrap();
    h.dispatcher.drain().await;

    // Assert
    let view = h.dispatcher.session_view().unwrap();
    assert_eq!(view.actions.len(), 2);
    assert_eq!(view.results.len(), 2);
    assert!(matches!(h.engine.calls()[1], EngineCall::Act { .. }));

    // Act: revert undoes it.
    let shown = h.dispatcher.revert(&room_a).await.unwrap();

    // Assert
    let view = h.dispatcher.session_view().unwrap();
    assert_eq!(view.actions.len(), 1);
    assert_eq!(shown, view.results[0]);
    assert_eq!(h.outbox.messages_for(&room_a).last(), Some(&view.results[0]));
}

#[tokio::test]
async fn test_engine_sees_requests_in_enqueue_order_one_at_a_time() {
    // Arrange
    let h = harness(ScriptedEngine::new().with_delay_when("action", Duration::from_millis(5)));
    let order = Arc::new(Mutex::new(Vec::new()));
    let mut producers = Vec::new();

    // Act
    for producer in 0..4 {
        let dispatcher = h.dispatcher.clone();
        let order = Arc::clone(&order);
        producers.push(tokio::spawn(async move {
            for n in 0..5 {
                let text = format!("action {producer}-{n}");
                {
                    let mut enqueued = order.lock().unwrap();
                    dispatcher.submit(room("room-a"), text.clone()).unwrap();
                    enqueued.push(text);
                }
                tokio::task::yield_now().await;
            }
        }));
    }
    for producer in producers {
        producer.await.unwrap();
    }
    h.dispatcher.drain().await;

    // Assert
    let seen: Vec<String> = h
        .engine
        .calls()
        .iter()
        .map(|call| call.action_line().trim_start_matches("> ").to_owned())
        .collect();
    assert_eq!(seen, *order.lock().unwrap());
    assert_eq!(h.engine.max_concurrency(), 1);
    assert_eq!(h.dispatcher.pending(), 0);
}

#[tokio::test]
async fn test_timed_out_request_does_not_block_the_next_one() {
    // Arrange
    let config = DispatcherConfig {
        generation_timeout: Duration::from_millis(200),
        ..config()
    };
    let engine = ScriptedEngine::new().with_delay_when("slow", Duration::from_millis(300));
    let h = harness_with(config, engine, None);
    let room_a = room("room-a");

    // Act
    h.dispatcher.submit(room_a.clone(), "slow start").unwrap();
    h.dispatcher.submit(room_a.clone(), "second").unwrap();
    h.dispatcher.drain().await;

    // Assert
    let delivered = h.outbox.messages_for(&room_a);
    assert_eq!(delivered.len(), 2);
    assert!(delivered[0].starts_with("> slow start\n"));
    assert!(delivered[0].contains("timed out"));
    assert_eq!(delivered[1], "> second\nresult 2");

    let view = h.dispatcher.session_view().unwrap();
    assert_eq!(view.actions, vec!["second".to_owned()]);
    assert_eq!(h.engine.max_concurrency(), 1);
}

#[tokio::test]
async fn test_timed_out_call_is_cancelled_and_frees_the_engine() {
    // The slow call runs at several multiples of the timeout; the next
    // request must still get a full budget.
    for multiple in [3_u32, 5, 10] {
        // Arrange
        let timeout = Duration::from_millis(200);
        let config = DispatcherConfig {
            generation_timeout: timeout,
            ..config()
        };
        let engine = ScriptedEngine::new().with_delay_when("slow", timeout * multiple);
        let h = harness_with(config, engine, None);
        let room_a = room("room-a");

        // Act
        h.dispatcher.submit(room_a.clone(), "slow start").unwrap();
        h.dispatcher.submit(room_a.clone(), "second").unwrap();
        h.dispatcher.drain().await;

        // Assert
        let delivered = h.outbox.messages_for(&room_a);
        assert_eq!(delivered.len(), 2, "delay of {multiple}x timeout");
        assert!(delivered[0].contains("timed out after 0.2s"));
        assert_eq!(
            delivered[1], "> second\nresult 2",
            "delay of {multiple}x timeout"
        );
        assert_eq!(h.engine.cancelled_calls(), 1);
        assert_eq!(h.engine.max_concurrency(), 1);
    }
}

#[tokio::test]
async fn test_echo_is_stripped_and_result_is_escaped_for_delivery() {
    // Arrange
    let engine = ScriptedEngine::new()
        .echoing_start()
        .with_replies(["The *door* is _ajar_."]);
    let h = harness(engine);
    let room_a = room("room-a");

    // Act
    h.dispatcher.submit(room_a.clone(), "look around").unwrap();
    h.dispatcher.drain().await;

    // Assert
    let view = h.dispatcher.session_view().unwrap();
    assert_eq!(view.results, vec!["The *door* is _ajar_.".to_owned()]);
    assert_eq!(
        h.outbox.messages_for(&room_a),
        vec!["> look around\nThe \\*door\\* is \\_ajar\\_.".to_owned()]
    );
}

#[tokio::test]
async fn test_session_view_does_not_wait_for_in_flight_turn() {
    // Arrange
    let engine = ScriptedEngine::new().with_delay_when("slow", Duration::from_millis(500));
    let h = harness(engine);
    let room_a = room("room-a");
    h.dispatcher.submit(room_a.clone(), "look around").unwrap();
    h.dispatcher.drain().await;

    // Act
    h.dispatcher.submit(room_a.clone(), "slow search").unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let during = h.dispatcher.session_view().unwrap();

    // Assert
    assert_eq!(h.engine.completed_calls(), 1);
    assert_eq!(during.actions, vec!["look around".to_owned()]);
    h.dispatcher.drain().await;
    let after = h.dispatcher.session_view().unwrap();
    assert_eq!(after.actions.len(), 2);
}

#[tokio::test]
async fn test_engine_failure_is_reported_and_loop_continues() {
    // Arrange
    let h = harness(ScriptedEngine::new().failing_when("explode"));
    let room_a = room("room-a");

    // Act
    h.dispatcher.submit(room_a.clone(), "look around").unwrap();
    h.dispatcher.submit(room_a.clone(), "explode").unwrap();
    h.dispatcher.submit(room_a.clone(), "wait").unwrap();
    h.dispatcher.drain().await;

    // Assert
    let delivered = h.outbox.messages_for(&room_a);
    assert_eq!(delivered.len(), 3);
    assert!(delivered[1].contains("engine failure"));
    let view = h.dispatcher.session_view().unwrap();
    assert_eq!(view.actions, vec!["look around".to_owned(), "wait".to_owned()]);
}

#[tokio::test]
async fn test_results_go_to_the_requesting_room() {
    let h = harness(ScriptedEngine::new());

    h.dispatcher.submit(room("room-a"), "one").unwrap();
    h.dispatcher.submit(room("room-b"), "two").unwrap();
    h.dispatcher.drain().await;

    assert_eq!(h.outbox.messages_for(&room("room-a")), vec!["> one\nresult 1".to_owned()]);
    assert_eq!(h.outbox.messages_for(&room("room-b")), vec!["> two\nresult 2".to_owned()]);
}

#[tokio::test]
async fn test_revert_with_empty_transcript_is_rejected() {
    // Arrange
    let h = harness(ScriptedEngine::new());
    let room_a = room("room-a");
    h.dispatcher.submit(room_a.clone(), "look around").unwrap();
    h.dispatcher.drain().await;
    h.dispatcher.restart(&room_a).await.unwrap();
    let before = h.dispatcher.session_view().unwrap();

    // Act
    let result = h.dispatcher.revert(&room_a).await;

    // Assert
    assert!(matches!(result, Err(GameError::InvalidTransition(_))));
    let after = h.dispatcher.session_view().unwrap();
    assert_eq!(after.actions, before.actions);
    assert_eq!(after.preamble, before.preamble);
}

#[tokio::test]
async fn test_restart_waits_for_in_flight_turn_and_drops_queued_ones() {
    // Arrange
    let h = harness(ScriptedEngine::new().with_delay_when("slow", Duration::from_millis(200)));
    let room_a = room("room-a");
    h.dispatcher.submit(room_a.clone(), "look around").unwrap();
    h.dispatcher.drain().await;
    h.dispatcher.submit(room_a.clone(), "slow search").unwrap();
    h.dispatcher.submit(room_a.clone(), "queued").unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Act
    let preamble = h.dispatcher.restart(&room_a).await.unwrap();

    // Assert
    assert_eq!(preamble, "You are a detective.");
    assert_eq!(h.engine.completed_calls(), 2);
    assert!(h.engine.calls().iter().all(|c| !c.action_line().contains("queued")));
    let view = h.dispatcher.session_view().unwrap();
    assert!(view.actions.is_empty());
    assert_eq!(view.preamble, "You are a detective.");

    let delivered = h.outbox.messages_for(&room_a);
    assert!(delivered.iter().any(|m| m.starts_with("> queued\nSkipped")));
    assert_eq!(
        &delivered[delivered.len() - 2..],
        ["Restarted game from beginning".to_owned(), "You are a detective.".to_owned()]
    );
}

#[tokio::test]
async fn test_actions_after_restart_build_on_cleared_transcript() {
    let h = harness(ScriptedEngine::new());
    let room_a = room("room-a");
    h.dispatcher.submit(room_a.clone(), "look around").unwrap();
    h.dispatcher.drain().await;
    h.dispatcher.restart(&room_a).await.unwrap();

    h.dispatcher.submit(room_a.clone(), "leave").unwrap();
    h.dispatcher.drain().await;

    let view = h.dispatcher.session_view().unwrap();
    assert_eq!(view.actions, vec!["leave".to_owned()]);
    assert_eq!(
        h.engine.calls()[1],
        EngineCall::Act {
            prompt: "You are a detective.\n> leave\n".into()
        }
    );
}

#[tokio::test]
async fn test_new_game_discards_story() {
    let h = harness(ScriptedEngine::new());
    let room_a = room("room-a");
    h.dispatcher.submit(room_a.clone(), "look around").unwrap();
    h.dispatcher.drain().await;

    h.dispatcher.new_game(&room_a).await;
    h.dispatcher.submit(room_a.clone(), "begin again").unwrap();
    h.dispatcher.drain().await;

    assert!(matches!(h.engine.calls()[1], EngineCall::Start { .. }));
    let view = h.dispatcher.session_view().unwrap();
    assert_eq!(view.actions, vec!["begin again".to_owned()]);
}

#[tokio::test]
async fn test_save_then_load_round_trips_through_dispatcher() {
    // Arrange
    let h = harness(ScriptedEngine::new());
    let room_a = room("room-a");
    h.dispatcher.submit(room_a.clone(), "look around").unwrap();
    h.dispatcher.submit(room_a.clone(), "wait").unwrap();
    h.dispatcher.drain().await;
    let saved_view = h.dispatcher.session_view().unwrap();

    // Act
    let id = h.dispatcher.save(&room_a).await.unwrap();
    h.dispatcher.new_game(&room_a).await;
    h.dispatcher.load(&room_a, &id).await.unwrap();

    // Assert
    let loaded = h.dispatcher.session_view().unwrap();
    assert_eq!(loaded.actions, saved_view.actions);
    assert_eq!(loaded.results, saved_view.results);
    assert_eq!(loaded.preamble, saved_view.preamble);
    assert!(h.repository.stored(&id).is_some());
    let delivered = h.outbox.messages_for(&room_a);
    assert!(delivered.contains(&format!(
        "To load the game, type 'load' and enter the following ID: {id}"
    )));
    assert!(delivered.contains(&"Loading Game...".to_owned()));
}

#[tokio::test]
async fn test_save_with_uploads_disabled_returns_no_identifier() {
    // Arrange
    let mut config = config();
    config.story.upload_enabled = false;
    let h = harness_with(config, ScriptedEngine::new(), None);
    let room_a = room("room-a");
    h.dispatcher.submit(room_a.clone(), "look around").unwrap();
    h.dispatcher.drain().await;

    // Act
    let result = h.dispatcher.save(&room_a).await;

    // Assert
    assert!(matches!(result, Err(GameError::InvalidTransition(_))));
    assert_eq!(h.repository.save_count(), 0);
    assert_eq!(h.dispatcher.session_view().unwrap().persistence_id, None);
}

#[tokio::test]
async fn test_exit_saves_and_stops_accepting_requests() {
    // Arrange
    let h = harness(ScriptedEngine::new());
    let room_a = room("room-a");
    h.dispatcher.submit(room_a.clone(), "look around").unwrap();
    h.dispatcher.drain().await;

    // Act
    let saved = h.dispatcher.exit(&room_a).await.unwrap();

    // Assert
    assert!(saved.is_some());
    assert!(h.dispatcher.shutdown_token().is_cancelled());
    assert!(matches!(
        h.dispatcher.submit(room_a.clone(), "too late"),
        Err(GameError::ShuttingDown)
    ));
    assert_eq!(
        h.outbox.messages_for(&room_a).last(),
        Some(&"Exiting game...".to_owned())
    );
    h.dispatcher.drain().await;
}

#[tokio::test]
async fn test_drain_waits_for_in_flight_generation() {
    let h = harness(ScriptedEngine::new().with_delay_when("slow", Duration::from_millis(100)));

    h.dispatcher.submit(room("room-a"), "slow").unwrap();
    h.dispatcher.drain().await;

    assert_eq!(h.engine.completed_calls(), 1);
    assert_eq!(h.outbox.deliveries().len(), 1);
}

#[tokio::test]
async fn test_result_is_spoken_in_bound_room() {
    // Arrange
    let voice = Arc::new(VoiceOutputManager::new(Arc::new(FakeSynthesizer::new())));
    let h = harness_with(config(), ScriptedEngine::new(), Some(voice));
    let room_a = room("room-a");
    let connection = Arc::new(FakeVoiceConnection::new());
    let as_dyn: Arc<dyn VoiceConnection> = connection.clone();
    h.dispatcher.join_voice(&room_a, &as_dyn).await.unwrap();

    // Act
    h.dispatcher.submit(room_a.clone(), "look around").unwrap();
    h.dispatcher.submit(room("room-b"), "elsewhere").unwrap();
    h.dispatcher.drain().await;
    for _ in 0..100 {
        if !connection.played().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // Assert
    assert_eq!(connection.played_text(), vec!["result 1".to_owned()]);
    h.dispatcher.leave_voice(&room_a).await.unwrap();
    assert!(matches!(
        h.dispatcher.leave_voice(&room_a).await,
        Err(GameError::InvalidTransition(_))
    ));
}

#[tokio::test]
async fn test_join_voice_without_voice_output_is_rejected() {
    let h = harness(ScriptedEngine::new());
    let connection: Arc<dyn VoiceConnection> = Arc::new(FakeVoiceConnection::new());

    let result = h.dispatcher.join_voice(&room("room-a"), &connection).await;

    assert!(matches!(result, Err(GameError::InvalidTransition(_))));
}
