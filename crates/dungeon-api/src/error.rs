//! Dungeon relay — API error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use dungeon_core::error::{GameError, StorageError};
use serde::Serialize;
use thiserror::Error;

/// Startup and runtime errors for the API server.
#[derive(Debug, Error)]
pub enum AppError {
    /// A required environment variable is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Network binding or I/O error.
    #[error("server error: {0}")]
    Server(#[from] std::io::Error),
}

/// Why a routed command was refused or failed.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The command name is not in the command table.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// The caller lacks the role the command requires.
    #[error("you need the {role} role to use {command}")]
    Unauthorized {
        /// The refused command.
        command: String,
        /// The role it requires.
        role: String,
    },

    /// No story is in progress.
    #[error("no game is in progress")]
    NoSession,

    /// The dispatcher rejected the operation.
    #[error(transparent)]
    Game(#[from] GameError),
}

/// JSON body returned for error responses.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code.
    pub error: &'static str,
    /// Human-readable error message.
    pub message: String,
}

/// HTTP-layer wrapper around `CommandError` that implements `IntoResponse`.
#[derive(Debug)]
pub struct ApiError(pub CommandError);

impl From<CommandError> for ApiError {
    fn from(err: CommandError) -> Self {
        Self(err)
    }
}

impl From<GameError> for ApiError {
    fn from(err: GameError) -> Self {
        Self(CommandError::Game(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = match &self.0 {
            CommandError::UnknownCommand(_) => (StatusCode::BAD_REQUEST, "unknown_command"),
            CommandError::Unauthorized { .. } => (StatusCode::FORBIDDEN, "unauthorized"),
            CommandError::NoSession => (StatusCode::NOT_FOUND, "no_session"),
            CommandError::Game(GameError::InvalidTransition(_)) => {
                (StatusCode::CONFLICT, "invalid_transition")
            }
            CommandError::Game(GameError::Storage(StorageError::NotFound(_))) => {
                (StatusCode::NOT_FOUND, "story_not_found")
            }
            CommandError::Game(GameError::Storage(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "storage_error")
            }
            CommandError::Game(GameError::ShuttingDown) => {
                (StatusCode::SERVICE_UNAVAILABLE, "shutting_down")
            }
            CommandError::Game(
                GameError::Timeout(_) | GameError::Engine(_) | GameError::VoiceUnavailable(_),
            ) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        let body = ErrorBody {
            error: error_code,
            message: self.0.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    fn status_of(err: impl Into<ApiError>) -> StatusCode {
        let response = err.into().into_response();
        response.status()
    }

    #[test]
    fn test_unknown_command_maps_to_400() {
        assert_eq!(
            status_of(CommandError::UnknownCommand("dance".into())),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_unauthorized_maps_to_403() {
        assert_eq!(
            status_of(CommandError::Unauthorized {
                command: "exit".into(),
                role: "chief".into(),
            }),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn test_invalid_transition_maps_to_409() {
        assert_eq!(
            status_of(GameError::invalid("There is nothing to revert.")),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_missing_story_maps_to_404() {
        assert_eq!(
            status_of(GameError::Storage(StorageError::NotFound("abc".into()))),
            StatusCode::NOT_FOUND
        );
        assert_eq!(status_of(CommandError::NoSession), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_storage_io_maps_to_500() {
        assert_eq!(
            status_of(GameError::Storage(StorageError::Io("disk full".into()))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_shutting_down_maps_to_503() {
        assert_eq!(
            status_of(GameError::ShuttingDown),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
