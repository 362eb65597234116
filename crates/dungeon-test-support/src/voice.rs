//! Test voice collaborators.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dungeon_core::destination::Destination;
use dungeon_core::error::VoiceError;
use dungeon_core::voice::{AudioClip, VoiceConnection, VoiceDirectory, VoiceSynthesizer};

/// A voice connection that records what it was asked to play.
#[derive(Debug)]
pub struct FakeVoiceConnection {
    connected: AtomicBool,
    current: Mutex<Option<AudioClip>>,
    played: Mutex<Vec<AudioClip>>,
    stops: AtomicUsize,
}

impl Default for FakeVoiceConnection {
    fn default() -> Self {
        Self {
            connected: AtomicBool::new(true),
            current: Mutex::new(None),
            played: Mutex::new(Vec::new()),
            stops: AtomicUsize::new(0),
        }
    }
}

impl FakeVoiceConnection {
    /// Create a connected fake.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the platform dropping the connection.
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    /// Every clip passed to `play`, in order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn played(&self) -> Vec<AudioClip> {
        self.played.lock().unwrap().clone()
    }

    /// Every clip played, decoded back to the text the fake synthesizer
    /// encoded.
    pub fn played_text(&self) -> Vec<String> {
        self.played()
            .into_iter()
            .map(|clip| String::from_utf8_lossy(&clip.bytes).into_owned())
            .collect()
    }

    /// Number of times a playing clip was stopped.
    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl VoiceConnection for FakeVoiceConnection {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn is_playing(&self) -> bool {
        self.current.lock().unwrap().is_some()
    }

    fn stop(&self) {
        if self.current.lock().unwrap().take().is_some() {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn play(&self, clip: AudioClip) -> Result<(), VoiceError> {
        if !self.is_connected() {
            return Err(VoiceError("not connected".into()));
        }
        let mut current = self.current.lock().unwrap();
        if current.is_some() {
            return Err(VoiceError("already playing".into()));
        }
        *current = Some(clip.clone());
        self.played.lock().unwrap().push(clip);
        Ok(())
    }
}

/// A synthesizer whose "audio" is the UTF-8 bytes of the text.
#[derive(Debug, Default)]
pub struct FakeSynthesizer {
    delays: Vec<(String, Duration)>,
    failing: bool,
    calls: AtomicUsize,
}

impl FakeSynthesizer {
    /// Create a synthesizer that succeeds immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep for `delay` when the text contains `needle`.
    #[must_use]
    pub fn with_delay_when(mut self, needle: &str, delay: Duration) -> Self {
        self.delays.push((needle.to_owned(), delay));
        self
    }

    /// Fail every synthesis.
    #[must_use]
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    /// Number of synthesis calls made.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl VoiceSynthesizer for FakeSynthesizer {
    fn synthesize(&self, text: &str) -> Result<AudioClip, VoiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some((_, delay)) = self.delays.iter().find(|(n, _)| text.contains(n.as_str())) {
            std::thread::sleep(*delay);
        }
        if self.failing {
            return Err(VoiceError("tts backend offline".into()));
        }
        Ok(AudioClip {
            bytes: text.as_bytes().to_vec(),
        })
    }
}

/// A directory of connections keyed by destination.
#[derive(Default)]
pub struct FakeVoiceDirectory {
    connections: Mutex<HashMap<Destination, Arc<dyn VoiceConnection>>>,
}

impl FakeVoiceDirectory {
    /// Create an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `connection` as the current one for `destination`.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn insert(&self, destination: Destination, connection: Arc<dyn VoiceConnection>) {
        self.connections
            .lock()
            .unwrap()
            .insert(destination, connection);
    }
}

impl VoiceDirectory for FakeVoiceDirectory {
    fn connection_for(&self, destination: &Destination) -> Option<Arc<dyn VoiceConnection>> {
        self.connections.lock().unwrap().get(destination).cloned()
    }
}
