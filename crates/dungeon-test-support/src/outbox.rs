//! Test outbox — records every delivery.

use std::sync::Mutex;

use async_trait::async_trait;
use dungeon_core::destination::Destination;
use dungeon_core::outbox::Outbox;

/// An outbox that keeps every delivered message in order.
#[derive(Debug, Default)]
pub struct RecordingOutbox {
    delivered: Mutex<Vec<(Destination, String)>>,
}

impl RecordingOutbox {
    /// Create an empty recording outbox.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all deliveries.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn deliveries(&self) -> Vec<(Destination, String)> {
        self.delivered.lock().unwrap().clone()
    }

    /// Returns the messages delivered to `destination`, oldest first.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn messages_for(&self, destination: &Destination) -> Vec<String> {
        self.delivered
            .lock()
            .unwrap()
            .iter()
            .filter(|(d, _)| d == destination)
            .map(|(_, m)| m.clone())
            .collect()
    }
}

#[async_trait]
impl Outbox for RecordingOutbox {
    async fn deliver(&self, destination: &Destination, message: String) {
        self.delivered
            .lock()
            .unwrap()
            .push((destination.clone(), message));
    }
}
