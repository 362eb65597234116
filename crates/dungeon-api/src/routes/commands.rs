//! Command intake from the chat-platform bridge.

use axum::extract::State;
use axum::{Json, Router, routing::post};
use dungeon_core::destination::Destination;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::ApiError;
use crate::router::{Invocation, Routed};
use crate::state::AppState;

/// Request body for POST /.
#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    /// Command name, e.g. `next` or `revert`.
    pub command: String,
    /// Platform identifier of the room; results are delivered there.
    pub room_id: Destination,
    /// Human-readable room name, checked against the game channel.
    pub room_name: String,
    /// The invoker's role names.
    #[serde(default)]
    pub roles: Vec<String>,
    /// Free text following the command.
    #[serde(default)]
    pub args: Option<String>,
}

/// Outcome of a routed command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    /// The command ran, or was queued.
    Accepted,
    /// The command came from outside the game room.
    Ignored,
}

/// Response body returned after a command is handled.
#[derive(Debug, Serialize)]
pub struct CommandResponse {
    /// What happened.
    pub status: CommandStatus,
    /// Set for queued actions; appears in the server logs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,
    /// Text produced synchronously by the command.
    pub replies: Vec<String>,
}

/// POST /
#[instrument(skip(state, request), fields(command = %request.command, room_id = %request.room_id))]
async fn handle_command(
    State(state): State<AppState>,
    Json(request): Json<CommandRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let invocation = Invocation {
        command: request.command,
        room_id: request.room_id,
        room_name: request.room_name,
        roles: request.roles,
        args: request.args,
    };

    let response = match state.router.route(invocation).await? {
        Routed::Ignored => CommandResponse {
            status: CommandStatus::Ignored,
            correlation_id: None,
            replies: Vec::new(),
        },
        Routed::Accepted {
            correlation_id,
            replies,
        } => {
            if let Some(id) = correlation_id {
                info!(correlation_id = %id, "action queued");
            }
            CommandResponse {
                status: CommandStatus::Accepted,
                correlation_id,
                replies,
            }
        }
    };

    Ok(Json(response))
}

/// Returns the router for command intake.
pub fn router() -> Router<AppState> {
    Router::new().route("/", post(handle_command))
}
