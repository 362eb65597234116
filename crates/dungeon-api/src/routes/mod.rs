//! HTTP routes for the chat-platform bridge.

use axum::Router;

use crate::state::AppState;

pub mod commands;
pub mod health;
pub mod rooms;
pub mod session;

/// The full route tree, before state is attached.
pub fn app() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .nest("/api/v1/commands", commands::router())
        .nest("/api/v1/rooms", rooms::router())
        .nest("/api/v1/session", session::router())
}
