//! Test repositories — mock `StoryRepository` implementations for tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use dungeon_core::error::StorageError;
use dungeon_core::repository::{StoredStory, StoryRepository};

/// A story repository backed by a map. Identifiers are `story-1`,
/// `story-2`, ... in save order.
#[derive(Debug, Default)]
pub struct InMemoryStoryRepository {
    stories: Mutex<HashMap<String, StoredStory>>,
    saves: Mutex<usize>,
}

impl InMemoryStoryRepository {
    /// Create an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the story stored under `id`, if any.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn stored(&self, id: &str) -> Option<StoredStory> {
        self.stories.lock().unwrap().get(id).cloned()
    }

    /// Number of successful saves.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn save_count(&self) -> usize {
        *self.saves.lock().unwrap()
    }
}

#[async_trait]
impl StoryRepository for InMemoryStoryRepository {
    async fn save(&self, story: &StoredStory) -> Result<String, StorageError> {
        let mut saves = self.saves.lock().unwrap();
        *saves += 1;
        let id = format!("story-{saves}");
        self.stories
            .lock()
            .unwrap()
            .insert(id.clone(), story.clone());
        Ok(id)
    }

    async fn load(&self, id: &str) -> Result<StoredStory, StorageError> {
        self.stories
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(id.to_owned()))
    }
}

/// A story repository that always returns an i/o error. Useful for testing
/// error-handling paths.
#[derive(Debug)]
pub struct FailingStoryRepository;

#[async_trait]
impl StoryRepository for FailingStoryRepository {
    async fn save(&self, _story: &StoredStory) -> Result<String, StorageError> {
        Err(StorageError::Io("disk full".into()))
    }

    async fn load(&self, _id: &str) -> Result<StoredStory, StorageError> {
        Err(StorageError::Io("disk full".into()))
    }
}
