//! Voice output boundary.
//!
//! The chat-platform layer owns the live audio connections. The relay only
//! ever holds weak references to them and re-checks liveness on every use,
//! since a connection may be dropped or replaced underneath it at any time.

use std::sync::Arc;

use crate::destination::Destination;
use crate::error::VoiceError;

/// A playable, already-encoded audio stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    /// Encoded audio bytes, opaque to the relay.
    pub bytes: Vec<u8>,
}

/// Turns text into audio. Blocking; run it off the async executor.
pub trait VoiceSynthesizer: Send + Sync {
    /// Synthesizes `text`.
    ///
    /// # Errors
    ///
    /// Returns `VoiceError` if synthesis fails.
    fn synthesize(&self, text: &str) -> Result<AudioClip, VoiceError>;
}

/// A live audio connection to a room.
pub trait VoiceConnection: Send + Sync {
    /// Whether the connection can still play audio.
    fn is_connected(&self) -> bool;

    /// Whether a clip is currently playing.
    fn is_playing(&self) -> bool;

    /// Stops the clip currently playing, if any.
    fn stop(&self);

    /// Starts playing `clip`.
    ///
    /// # Errors
    ///
    /// Returns `VoiceError` if the platform refuses the clip.
    fn play(&self, clip: AudioClip) -> Result<(), VoiceError>;
}

/// Lookup of the platform's current connection for a room, used to recover
/// when a bound connection has been replaced.
pub trait VoiceDirectory: Send + Sync {
    /// Returns the live connection for `destination`, if any.
    fn connection_for(&self, destination: &Destination) -> Option<Arc<dyn VoiceConnection>>;
}
