//! Outgoing message pickup for the bridge.

use axum::extract::{Path, State};
use axum::{Json, Router, routing::get};
use dungeon_core::destination::Destination;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::state::AppState;

/// Response body for GET /{room_id}/messages.
#[derive(Debug, Serialize)]
pub struct MessagesResponse {
    /// Messages for the room, oldest first. Each is returned once.
    pub messages: Vec<String>,
}

/// GET /{room_id}/messages
#[instrument(skip(state))]
async fn take_messages(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Json<MessagesResponse> {
    let messages = state.mailbox.take(&Destination::new(room_id));
    debug!(count = messages.len(), "messages collected");
    Json(MessagesResponse { messages })
}

/// Returns the router for room mailboxes.
pub fn router() -> Router<AppState> {
    Router::new().route("/{room_id}/messages", get(take_messages))
}
