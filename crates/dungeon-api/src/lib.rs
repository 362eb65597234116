//! Dungeon relay — HTTP bridge.
//!
//! A chat-platform bridge posts room commands here and polls each room's
//! mailbox for the messages the relay wants shown.

pub mod config;
pub mod engine;
pub mod error;
pub mod mailbox;
pub mod router;
pub mod routes;
pub mod state;
