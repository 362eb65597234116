//! Error types shared by every layer of the relay.

use std::time::Duration;

use thiserror::Error;

/// Top-level error type for relay operations.
#[derive(Debug, Error)]
pub enum GameError {
    /// Generation exceeded the configured bound.
    #[error("generation timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),

    /// The generation call failed.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The operation is not legal in the current session state.
    #[error("{0}")]
    InvalidTransition(String),

    /// The storage collaborator failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// No live voice connection exists for the destination. Never shown to
    /// users; speaking degrades to text-only delivery.
    #[error("no voice connection for {0}")]
    VoiceUnavailable(String),

    /// The dispatcher has stopped accepting requests.
    #[error("the game is shutting down")]
    ShuttingDown,
}

impl GameError {
    /// Shorthand for an `InvalidTransition` rejection.
    #[must_use]
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidTransition(reason.into())
    }
}

/// Failure reported by the generation engine.
#[derive(Debug, Clone, Error)]
#[error("engine failure: {0}")]
pub struct EngineError(pub String);

/// Failure reported by the story storage collaborator.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// No story is stored under the identifier.
    #[error("no saved game with id {0}")]
    NotFound(String),

    /// Reading or writing the backing store failed.
    #[error("storage i/o error: {0}")]
    Io(String),

    /// A stored story could not be decoded.
    #[error("stored game {id} is unreadable: {reason}")]
    Corrupt {
        /// The identifier of the unreadable story.
        id: String,
        /// Why decoding failed.
        reason: String,
    },
}

/// Failure reported by the voice synthesis collaborator.
#[derive(Debug, Clone, Error)]
#[error("voice synthesis failed: {0}")]
pub struct VoiceError(pub String);
