//! Dungeon Core — shared abstractions for the dungeon relay.
//!
//! This crate defines the types every other crate agrees on and the
//! capability traits for the external collaborators: the generation engine,
//! story storage, result delivery and voice output. It contains no
//! infrastructure code.

pub mod clock;
pub mod destination;
pub mod engine;
pub mod error;
pub mod outbox;
pub mod repository;
pub mod voice;
