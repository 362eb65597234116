//! Result delivery boundary.

use async_trait::async_trait;

use crate::destination::Destination;

/// Delivers text to a destination on the chat platform.
///
/// Delivery is best effort: an implementation logs its own transport
/// failures, the relay has nobody else to report them to.
#[async_trait]
pub trait Outbox: Send + Sync {
    /// Sends `message` to `destination`.
    async fn deliver(&self, destination: &Destination, message: String);
}
