//! Dungeon relay — story session bounded context.
//!
//! Owns the live narrative transcript and the rules for which operations
//! are legal on it: starting a story, acting, reverting, restarting,
//! saving and loading.

pub mod application;
pub mod domain;
