//! Filesystem implementation of the `StoryRepository` trait.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};
use uuid::Uuid;

use dungeon_core::error::StorageError;
use dungeon_core::repository::{StoredStory, StoryRepository};

/// Stores each story as a pretty-printed JSON document named after a
/// random UUID.
#[derive(Debug, Clone)]
pub struct FileStoryRepository {
    root: PathBuf,
}

impl FileStoryRepository {
    /// Creates a repository rooted at `root`. The directory is created on
    /// first save.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The directory stories are written to.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Only canonical UUIDs name a file, so an identifier can never escape
    /// the root directory.
    fn path_for(&self, id: &str) -> Option<PathBuf> {
        let id = Uuid::parse_str(id.trim()).ok()?;
        Some(self.root.join(format!("{}.json", id.hyphenated())))
    }
}

#[async_trait]
impl StoryRepository for FileStoryRepository {
    async fn save(&self, story: &StoredStory) -> Result<String, StorageError> {
        let id = Uuid::new_v4().to_string();
        let path = self.root.join(format!("{id}.json"));
        let body = serde_json::to_vec_pretty(story)
            .map_err(|e| StorageError::Io(format!("encoding story: {e}")))?;

        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| StorageError::Io(format!("{}: {e}", self.root.display())))?;
        tokio::fs::write(&path, body)
            .await
            .map_err(|e| StorageError::Io(format!("{}: {e}", path.display())))?;

        info!(persistence_id = %id, turns = story.actions.len(), "story saved");
        Ok(id)
    }

    async fn load(&self, id: &str) -> Result<StoredStory, StorageError> {
        let Some(path) = self.path_for(id) else {
            debug!(id, "rejecting malformed story id");
            return Err(StorageError::NotFound(id.to_owned()));
        };

        let body = match tokio::fs::read(&path).await {
            Ok(body) => body,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StorageError::NotFound(id.to_owned()));
            }
            Err(e) => return Err(StorageError::Io(format!("{}: {e}", path.display()))),
        };

        serde_json::from_slice(&body).map_err(|e| StorageError::Corrupt {
            id: id.to_owned(),
            reason: e.to_string(),
        })
    }
}
