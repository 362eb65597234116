//! Session state machine.
//!
//! There is at most one live [`Session`]. With none, the first accepted
//! action starts the story; afterwards actions continue it. Administrative
//! transitions (revert, restart, new game, load) operate on the same state
//! and must only run once in-flight generation has drained, which the
//! dispatcher guarantees.

use dungeon_core::engine::{CancellationToken, GenerationEngine};
use dungeon_core::error::{EngineError, GameError};
use dungeon_core::repository::StoredStory;
use serde::Serialize;
use tracing::{debug, info};

use super::aggregates::{Session, frame_action};

/// Action used when a player submits nothing.
pub const DEFAULT_ACTION: &str = "continue";

/// How many recent turns the generator sees by default.
pub const DEFAULT_MAX_HISTORY: usize = 20;

/// Coarse state of the story.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoryState {
    /// No session exists; the next action starts one.
    NoSession,
    /// A story is in progress.
    Active,
}

/// Settings applied to every session the machine creates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorySettings {
    /// Opening text handed to the generator and kept as the preamble.
    pub context: String,
    /// Whether new sessions may be saved.
    pub upload_enabled: bool,
    /// How many recent turns are included in generation prompts.
    pub max_history: usize,
}

impl Default for StorySettings {
    fn default() -> Self {
        Self {
            context: String::new(),
            upload_enabled: true,
            max_history: DEFAULT_MAX_HISTORY,
        }
    }
}

/// The generation call a turn needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationPlan {
    /// No story yet: open one.
    Start {
        /// The framed first action.
        prompt: String,
        /// The story context.
        context: String,
    },
    /// Continue the live story.
    Act {
        /// Recent story text followed by the framed action.
        prompt: String,
    },
}

impl GenerationPlan {
    /// Runs the plan against `engine`. Blocks for as long as the engine does,
    /// or until the engine notices `cancel`.
    ///
    /// # Errors
    ///
    /// Returns the engine's error unchanged.
    pub fn generate(
        &self,
        engine: &dyn GenerationEngine,
        cancel: &CancellationToken,
    ) -> Result<String, EngineError> {
        match self {
            Self::Start { prompt, context } => engine.start_story(prompt, context, cancel),
            Self::Act { prompt } => engine.act(prompt, cancel),
        }
    }
}

/// A turn that has been planned but not yet generated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTurn {
    /// The action as it will be recorded.
    pub action: String,
    /// What to ask the engine.
    pub plan: GenerationPlan,
}

/// Governs which operations are legal and applies them to the session.
#[derive(Debug)]
pub struct SessionStateMachine {
    session: Option<Session>,
    settings: StorySettings,
}

impl SessionStateMachine {
    /// Creates a machine with no session.
    #[must_use]
    pub fn new(settings: StorySettings) -> Self {
        Self {
            session: None,
            settings,
        }
    }

    /// The current coarse state.
    #[must_use]
    pub fn state(&self) -> StoryState {
        if self.session.is_some() {
            StoryState::Active
        } else {
            StoryState::NoSession
        }
    }

    /// The live session, if any.
    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// The settings new sessions are created with.
    #[must_use]
    pub fn settings(&self) -> &StorySettings {
        &self.settings
    }

    /// Plans the generation call for `text`. Blank text becomes
    /// [`DEFAULT_ACTION`].
    #[must_use]
    pub fn begin_turn(&self, text: &str) -> PendingTurn {
        let action = if text.trim().is_empty() {
            DEFAULT_ACTION.to_owned()
        } else {
            text.to_owned()
        };

        let plan = match &self.session {
            None => GenerationPlan::Start {
                prompt: frame_action(&action),
                context: self.settings.context.clone(),
            },
            Some(session) => {
                let mut prompt = session.context_window(self.settings.max_history);
                prompt.push_str(&frame_action(&action));
                GenerationPlan::Act { prompt }
            }
        };

        PendingTurn { action, plan }
    }

    /// Records the engine's output for `turn` and returns the result text.
    ///
    /// A `Start` turn creates the session, with the story context as its
    /// preamble, and strips the generator's echo of the prompt.
    ///
    /// # Errors
    ///
    /// Returns `GameError::InvalidTransition` if an `Act` turn completes
    /// after the session it was planned against has gone.
    pub fn complete_turn(&mut self, turn: PendingTurn, output: String) -> Result<String, GameError> {
        let PendingTurn { action, plan } = turn;
        let result = match &plan {
            GenerationPlan::Start { prompt, .. } => strip_echo(prompt, &output),
            GenerationPlan::Act { .. } => output,
        };

        let session = match plan {
            GenerationPlan::Start { context, .. } => {
                if self.session.is_none() {
                    info!("starting new story");
                }
                let upload_enabled = self.settings.upload_enabled;
                self.session
                    .get_or_insert_with(|| Session::new(context, upload_enabled))
            }
            GenerationPlan::Act { .. } => self.session.as_mut().ok_or_else(|| {
                GameError::invalid("The game was reset before this action finished.")
            })?,
        };

        session.record(action, result.clone());
        debug!(turns = session.turn_count(), "recorded turn");
        Ok(result)
    }

    /// Undoes the latest turn and returns the text now current.
    ///
    /// # Errors
    ///
    /// Returns `GameError::InvalidTransition` when there is no story or no
    /// turn to undo; the session is left unchanged.
    pub fn revert(&mut self) -> Result<String, GameError> {
        let session = self.active_mut()?;
        if session.pop_turn().is_none() {
            return Err(GameError::invalid("There is nothing to revert."));
        }
        info!(turns = session.turn_count(), "reverted last turn");
        Ok(session.latest_text().to_owned())
    }

    /// Clears the transcript, keeps the preamble, and returns the preamble.
    ///
    /// # Errors
    ///
    /// Returns `GameError::InvalidTransition` when no story is in progress.
    pub fn restart(&mut self) -> Result<String, GameError> {
        let session = self.active_mut()?;
        session.clear_transcript();
        info!("restarted story from the beginning");
        Ok(session.preamble().to_owned())
    }

    /// Discards the session. The next action starts a new story.
    pub fn new_game(&mut self) {
        if self.session.take().is_some() {
            info!("discarded story for a new game");
        }
    }

    /// Snapshot to hand to storage for a save.
    ///
    /// # Errors
    ///
    /// Returns `GameError::InvalidTransition` when no story is in progress or
    /// uploads are disabled for it.
    pub fn snapshot_for_save(&self) -> Result<StoredStory, GameError> {
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| GameError::invalid("There is no game to save yet."))?;
        if !session.upload_enabled() {
            return Err(GameError::invalid("Saving is disabled for this game."));
        }
        Ok(session.to_stored())
    }

    /// Records a successful save.
    pub fn mark_saved(&mut self, id: String) {
        if let Some(session) = self.session.as_mut() {
            session.set_persistence_id(id);
        }
    }

    /// Whether a load may replace the current state.
    ///
    /// # Errors
    ///
    /// Returns `GameError::InvalidTransition` when the live session has
    /// uploads disabled.
    pub fn check_load_allowed(&self) -> Result<(), GameError> {
        match &self.session {
            Some(session) if !session.upload_enabled() => {
                Err(GameError::invalid("Loading is disabled for this game."))
            }
            _ => Ok(()),
        }
    }

    /// Replaces the session with a stored story and returns the story so far.
    pub fn install_loaded(&mut self, id: &str, stored: StoredStory) -> String {
        let session = self
            .session
            .get_or_insert_with(|| Session::new(String::new(), true));
        *session = Session::from_stored(stored, id, session.upload_enabled());
        info!(persistence_id = id, turns = session.turn_count(), "loaded story");
        session.render()
    }

    /// Whether an exit should persist the story first.
    #[must_use]
    pub fn should_persist_on_exit(&self) -> bool {
        self.session.as_ref().is_some_and(Session::upload_enabled)
    }

    fn active_mut(&mut self) -> Result<&mut Session, GameError> {
        self.session
            .as_mut()
            .ok_or_else(|| GameError::invalid("No game is in progress."))
    }
}

/// Removes a leading echo of `prompt` from generated text.
fn strip_echo(prompt: &str, output: &str) -> String {
    let echo = prompt.trim();
    let body = output.trim_start();
    body.strip_prefix(echo)
        .unwrap_or(body)
        .trim_start()
        .to_owned()
}
