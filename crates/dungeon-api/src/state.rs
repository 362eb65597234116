//! Shared application state.

use std::sync::Arc;

use dungeon_dispatch::Dispatcher;

use crate::mailbox::Mailbox;
use crate::router::CommandRouter;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// The running dispatcher, for read queries.
    pub dispatcher: Dispatcher,
    /// Turns chat commands into dispatcher operations.
    pub router: Arc<CommandRouter>,
    /// Messages waiting for the bridge, per room.
    pub mailbox: Arc<Mailbox>,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(dispatcher: Dispatcher, router: CommandRouter, mailbox: Arc<Mailbox>) -> Self {
        Self {
            dispatcher,
            router: Arc::new(router),
            mailbox,
        }
    }
}
