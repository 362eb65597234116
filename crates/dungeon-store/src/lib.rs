//! Story persistence for the dungeon relay.

pub mod file_story_repository;

pub use file_story_repository::FileStoryRepository;
