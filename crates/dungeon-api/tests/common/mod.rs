//! Shared test helpers for API integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use dungeon_core::clock::Clock;
use dungeon_dispatch::{Dispatcher, DispatcherConfig, DispatcherParts};
use dungeon_session::domain::state_machine::StorySettings;
use dungeon_store::FileStoryRepository;
use dungeon_test_support::{FixedClock, ScriptedEngine};
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;

use dungeon_api::mailbox::Mailbox;
use dungeon_api::router::{CommandRouter, RoutePolicy};
use dungeon_api::routes;
use dungeon_api::state::AppState;

/// Room name every test command is sent from.
pub const CHANNEL: &str = "active-investigations";

/// A running app plus the handles tests inspect.
pub struct TestApp {
    pub state: AppState,
    pub engine: Arc<ScriptedEngine>,
    /// Keeps the save directory alive for the test's duration.
    pub saves: TempDir,
}

impl TestApp {
    /// The full router with state attached. Cheap; build one per request.
    pub fn router(&self) -> Router {
        routes::app().with_state(self.state.clone())
    }
}

/// Fixed timestamp used across all integration tests.
fn fixed_clock() -> Arc<dyn Clock> {
    Arc::new(FixedClock::standard())
}

/// Build the full app with a scripted engine and a file store in a fresh
/// temporary directory. Uses the same route structure as `main.rs`.
pub fn build_test_app(engine: ScriptedEngine) -> TestApp {
    let saves = TempDir::new().unwrap();
    let engine = Arc::new(engine);
    let mailbox = Arc::new(Mailbox::new());
    let (dispatcher, _worker) = Dispatcher::spawn(
        DispatcherConfig {
            generation_timeout: Duration::from_secs(5),
            story: StorySettings {
                context: "You are a detective.".into(),
                ..StorySettings::default()
            },
        },
        DispatcherParts {
            engine: engine.clone(),
            outbox: mailbox.clone(),
            repository: Arc::new(FileStoryRepository::new(saves.path())),
            voice: None,
            clock: fixed_clock(),
        },
    );
    let router = CommandRouter::new(
        dispatcher.clone(),
        RoutePolicy {
            channel: CHANNEL.into(),
            admin_role: "chief".into(),
        },
    );

    TestApp {
        state: AppState::new(dispatcher, router, mailbox),
        engine,
        saves,
    }
}

/// Builds a command body sent from the game room.
pub fn command(name: &str, roles: &[&str], args: Option<&str>) -> serde_json::Value {
    serde_json::json!({
        "command": name,
        "room_id": "room-1",
        "room_name": CHANNEL,
        "roles": roles,
        "args": args,
    })
}

/// Send a POST request with a JSON body and return the response.
pub async fn post_json(
    app: Router,
    uri: &str,
    body: &serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();

    (status, json)
}

/// Send a GET request and return the response.
pub async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();

    (status, json)
}
