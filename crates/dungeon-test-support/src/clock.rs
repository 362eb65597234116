//! Frozen clock for request timestamps.

use chrono::{DateTime, TimeZone, Utc};
use dungeon_core::clock::Clock;

/// A clock stuck at one instant, so request stamps and queue latencies are
/// reproducible.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl FixedClock {
    /// 2026-01-15 10:00:00 UTC, the instant most tests run at.
    ///
    /// # Panics
    ///
    /// Never in practice; the date is a valid UTC instant.
    #[must_use]
    pub fn standard() -> Self {
        Self(Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
