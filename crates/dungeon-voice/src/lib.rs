//! Dungeon relay — voice output.
//!
//! Mirrors generated text to a live audio connection per room. Everything
//! here is best effort: a missing or dropped connection silently degrades
//! to text-only delivery.

pub mod manager;

pub use manager::VoiceOutputManager;
