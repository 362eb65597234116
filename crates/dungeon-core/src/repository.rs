//! Story storage abstraction.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Stored representation of a story transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredStory {
    /// The story's opening text.
    pub preamble: String,
    /// Accepted user turns, oldest first.
    pub actions: Vec<String>,
    /// Generated continuations, one per action.
    pub results: Vec<String>,
}

/// Repository trait for saving and loading stories by opaque identifier.
#[async_trait]
pub trait StoryRepository: Send + Sync {
    /// Persists `story` and returns the identifier it can be loaded with.
    async fn save(&self, story: &StoredStory) -> Result<String, StorageError>;

    /// Loads the story stored under `id`.
    async fn load(&self, id: &str) -> Result<StoredStory, StorageError>;
}
