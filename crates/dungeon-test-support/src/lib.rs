//! Shared test fakes and utilities for the dungeon relay.

mod clock;
mod engine;
mod outbox;
mod repository;
mod voice;

pub use clock::FixedClock;
pub use engine::{EngineCall, ScriptedEngine};
pub use outbox::RecordingOutbox;
pub use repository::{FailingStoryRepository, InMemoryStoryRepository};
pub use voice::{FakeSynthesizer, FakeVoiceConnection, FakeVoiceDirectory};
