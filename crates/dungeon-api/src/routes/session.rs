//! Read access to the live story.

use axum::extract::State;
use axum::{Json, Router, routing::get};
use dungeon_session::application::query_handlers::SessionView;
use tracing::instrument;

use crate::error::{ApiError, CommandError};
use crate::state::AppState;

/// GET /
///
/// Answers from the snapshot taken when the last turn finished, so it
/// never waits on a generation in progress.
#[instrument(skip(state))]
async fn get_session(State(state): State<AppState>) -> Result<Json<SessionView>, ApiError> {
    let view = state
        .dispatcher
        .session_view()
        .ok_or(CommandError::NoSession)?;
    Ok(Json(view))
}

/// Returns the router for the session view.
pub fn router() -> Router<AppState> {
    Router::new().route("/", get(get_session))
}
