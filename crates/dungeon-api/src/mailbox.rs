//! Per-room mailbox the bridge polls for outgoing messages.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use dungeon_core::destination::Destination;
use dungeon_core::outbox::Outbox;
use tracing::{debug, warn};

/// Messages kept per room before the oldest are dropped.
pub const DEFAULT_ROOM_BACKLOG: usize = 256;

type Rooms = HashMap<Destination, VecDeque<String>>;

/// Holds messages for each room until the bridge collects them.
///
/// Each room keeps at most `capacity` messages; when a room that is never
/// polled overflows, its oldest messages are dropped.
#[derive(Debug)]
pub struct Mailbox {
    rooms: Mutex<Rooms>,
    capacity: usize,
}

impl Default for Mailbox {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_ROOM_BACKLOG)
    }
}

impl Mailbox {
    /// Creates an empty mailbox with the default per-room backlog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty mailbox keeping at most `capacity` messages per
    /// room. A capacity of zero is treated as one.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Removes and returns every message waiting for `destination`, oldest
    /// first.
    pub fn take(&self, destination: &Destination) -> Vec<String> {
        self.lock()
            .remove(destination)
            .map(Vec::from)
            .unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, Rooms> {
        self.rooms.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Outbox for Mailbox {
    async fn deliver(&self, destination: &Destination, message: String) {
        debug!(%destination, len = message.len(), "message queued for bridge");
        let mut rooms = self.lock();
        let backlog = rooms.entry(destination.clone()).or_default();
        if backlog.len() == self.capacity {
            backlog.pop_front();
            warn!(
                %destination,
                capacity = self.capacity,
                "room backlog full, dropped oldest message"
            );
        }
        backlog.push_back(message);
    }
}
