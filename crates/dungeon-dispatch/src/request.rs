//! The queued unit of work.

use chrono::{DateTime, Utc};
use dungeon_core::clock::Clock;
use dungeon_core::destination::Destination;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One player action waiting for generation. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Correlation ID for tracing the request through the worker.
    pub correlation_id: Uuid,
    /// Where the outcome must be delivered.
    pub destination: Destination,
    /// The action text, as typed.
    pub text: String,
    /// Admission time. Observability only; queue order is authoritative.
    pub submitted_at: DateTime<Utc>,
}

impl Request {
    /// Creates a request stamped with the clock's current time.
    #[must_use]
    pub fn new(destination: Destination, text: impl Into<String>, clock: &dyn Clock) -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            destination,
            text: text.into(),
            submitted_at: clock.now(),
        }
    }
}
