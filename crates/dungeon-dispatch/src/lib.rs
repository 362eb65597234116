//! Dungeon relay — request dispatcher.
//!
//! Turns a multi-producer stream of player actions into a strictly
//! serialized sequence of calls against the non-reentrant generation
//! engine, and relays each outcome back to the room that asked.

pub mod dispatcher;
pub mod format;
pub mod request;

pub use dispatcher::{Dispatcher, DispatcherConfig, DispatcherParts};
pub use request::Request;
