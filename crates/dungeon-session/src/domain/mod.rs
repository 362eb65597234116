//! Session domain model.

pub mod aggregates;
pub mod state_machine;
