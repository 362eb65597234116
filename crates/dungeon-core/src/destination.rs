//! Opaque delivery targets.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifies where a result must be delivered: a logical room or channel.
///
/// The relay never interprets the value; it is whatever the chat-platform
/// layer uses to address a room.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Destination(String);

impl Destination {
    /// Wraps a platform room identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Destination {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for Destination {
    fn from(id: String) -> Self {
        Self(id)
    }
}
