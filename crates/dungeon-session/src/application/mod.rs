//! Application services over the session state machine.

pub mod command_handlers;
pub mod query_handlers;
