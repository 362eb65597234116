//! Command handlers for storage-backed session operations.
//!
//! These orchestrate the state machine and the story repository: validate
//! the transition, call storage, then apply the outcome.

use dungeon_core::error::GameError;
use dungeon_core::repository::StoryRepository;
use tracing::{info, warn};

use crate::domain::state_machine::SessionStateMachine;

/// Handles `save`: persists the live story and returns its identifier.
///
/// # Errors
///
/// Returns `GameError::InvalidTransition` if there is no story or uploads
/// are disabled (nothing is written), or `GameError::Storage` if the
/// repository fails.
pub async fn handle_save(
    machine: &mut SessionStateMachine,
    repo: &dyn StoryRepository,
) -> Result<String, GameError> {
    let snapshot = machine.snapshot_for_save()?;
    let id = repo.save(&snapshot).await.inspect_err(|e| {
        warn!(error = %e, "saving story failed");
    })?;
    machine.mark_saved(id.clone());
    info!(persistence_id = %id, "saved story");
    Ok(id)
}

/// Handles `load`: replaces the live story with the one stored under `id`
/// and returns the story so far.
///
/// # Errors
///
/// Returns `GameError::InvalidTransition` if the live session forbids
/// loading, or `GameError::Storage` if the repository fails. The live
/// session is untouched on error.
pub async fn handle_load(
    machine: &mut SessionStateMachine,
    id: &str,
    repo: &dyn StoryRepository,
) -> Result<String, GameError> {
    machine.check_load_allowed()?;
    let stored = repo.load(id).await.inspect_err(|e| {
        warn!(persistence_id = id, error = %e, "loading story failed");
    })?;
    Ok(machine.install_loaded(id, stored))
}

/// Handles `exit`: persists the story when uploads are enabled. Returns the
/// save identifier, if one was written.
///
/// # Errors
///
/// Returns `GameError::Storage` if the final save fails; the caller must
/// not shut down in that case.
pub async fn handle_exit(
    machine: &mut SessionStateMachine,
    repo: &dyn StoryRepository,
) -> Result<Option<String>, GameError> {
    if !machine.should_persist_on_exit() {
        info!("exiting without saving");
        return Ok(None);
    }
    handle_save(machine, repo).await.map(Some)
}
