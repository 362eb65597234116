//! Query handlers for the session context.

use serde::Serialize;

use crate::domain::state_machine::{SessionStateMachine, StoryState};

/// Read-only view of the live session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    /// Always `active`; there is no view without a session.
    pub state: StoryState,
    /// The story's opening text.
    pub preamble: String,
    /// Accepted player turns, oldest first.
    pub actions: Vec<String>,
    /// Generated continuations, one per action.
    pub results: Vec<String>,
    /// Identifier of the last save or load.
    pub persistence_id: Option<String>,
    /// Whether save and load are permitted.
    pub upload_enabled: bool,
}

/// Returns a view of the live session, or `None` when no story is in
/// progress.
#[must_use]
pub fn current_session(machine: &SessionStateMachine) -> Option<SessionView> {
    let session = machine.session()?;
    Some(SessionView {
        state: machine.state(),
        preamble: session.preamble().to_owned(),
        actions: session.actions().to_vec(),
        results: session.results().to_vec(),
        persistence_id: session.persistence_id().map(str::to_owned),
        upload_enabled: session.upload_enabled(),
    })
}
