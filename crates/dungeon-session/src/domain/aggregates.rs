//! The story session aggregate.

use dungeon_core::repository::StoredStory;

/// Frames a player action the way the generator expects to see it in a
/// prompt: on its own line, quoted.
#[must_use]
pub fn frame_action(action: &str) -> String {
    format!("\n> {action}\n")
}

/// The mutable state of one ongoing narrative.
///
/// `actions` and `results` always have the same length: every mutation
/// adds or removes a whole turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    preamble: String,
    actions: Vec<String>,
    results: Vec<String>,
    persistence_id: Option<String>,
    upload_enabled: bool,
}

impl Session {
    /// Creates a session with an empty transcript.
    #[must_use]
    pub fn new(preamble: impl Into<String>, upload_enabled: bool) -> Self {
        Self {
            preamble: preamble.into(),
            actions: Vec::new(),
            results: Vec::new(),
            persistence_id: None,
            upload_enabled,
        }
    }

    /// Rebuilds a session from storage.
    #[must_use]
    pub fn from_stored(stored: StoredStory, persistence_id: &str, upload_enabled: bool) -> Self {
        let StoredStory {
            preamble,
            mut actions,
            mut results,
        } = stored;
        // A hand-edited save may be ragged; keep only whole turns.
        let turns = actions.len().min(results.len());
        actions.truncate(turns);
        results.truncate(turns);
        Self {
            preamble,
            actions,
            results,
            persistence_id: Some(persistence_id.to_owned()),
            upload_enabled,
        }
    }

    /// Snapshot for the storage collaborator.
    #[must_use]
    pub fn to_stored(&self) -> StoredStory {
        StoredStory {
            preamble: self.preamble.clone(),
            actions: self.actions.clone(),
            results: self.results.clone(),
        }
    }

    /// The story's opening text.
    #[must_use]
    pub fn preamble(&self) -> &str {
        &self.preamble
    }

    /// Accepted player turns, oldest first.
    #[must_use]
    pub fn actions(&self) -> &[String] {
        &self.actions
    }

    /// Generated continuations, one per action.
    #[must_use]
    pub fn results(&self) -> &[String] {
        &self.results
    }

    /// Identifier of the last successful save or load.
    #[must_use]
    pub fn persistence_id(&self) -> Option<&str> {
        self.persistence_id.as_deref()
    }

    /// Whether save and load are permitted.
    #[must_use]
    pub fn upload_enabled(&self) -> bool {
        self.upload_enabled
    }

    /// Number of recorded turns.
    #[must_use]
    pub fn turn_count(&self) -> usize {
        self.actions.len()
    }

    /// The text a player should see as "where the story is now": the last
    /// result, or the preamble when nothing has happened yet.
    #[must_use]
    pub fn latest_text(&self) -> &str {
        self.results.last().map_or(self.preamble.as_str(), String::as_str)
    }

    /// Records one completed turn.
    pub fn record(&mut self, action: String, result: String) {
        self.actions.push(action);
        self.results.push(result);
    }

    /// Removes the most recent turn, returning it.
    pub fn pop_turn(&mut self) -> Option<(String, String)> {
        let action = self.actions.pop()?;
        let result = self.results.pop().unwrap_or_default();
        Some((action, result))
    }

    /// Clears the transcript, keeping the preamble.
    pub fn clear_transcript(&mut self) {
        self.actions.clear();
        self.results.clear();
    }

    pub(crate) fn set_persistence_id(&mut self, id: String) {
        self.persistence_id = Some(id);
    }

    /// The whole story as a reader would see it.
    #[must_use]
    pub fn render(&self) -> String {
        self.render_from(0)
    }

    /// The generator's view of the story: the preamble plus at most
    /// `max_history` of the latest turns.
    #[must_use]
    pub fn context_window(&self, max_history: usize) -> String {
        self.render_from(self.turn_count().saturating_sub(max_history))
    }

    fn render_from(&self, first_turn: usize) -> String {
        let mut text = self.preamble.clone();
        for (action, result) in self.actions.iter().zip(&self.results).skip(first_turn) {
            text.push_str(&frame_action(action));
            text.push_str(result);
        }
        text
    }
}
