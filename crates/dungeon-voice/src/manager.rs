//! Voice output manager.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use dungeon_core::destination::Destination;
use dungeon_core::error::GameError;
use dungeon_core::voice::{AudioClip, VoiceConnection, VoiceDirectory, VoiceSynthesizer};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// A room's audio binding. Holds the connection weakly: the platform layer
/// owns it and may drop or replace it at any time.
struct VoiceBinding {
    connection: Weak<dyn VoiceConnection>,
    /// Ticket of the newest `speak` for this room. Older speaks finishing
    /// synthesis later must not play.
    latest_ticket: u64,
}

type Bindings = HashMap<Destination, VoiceBinding>;

/// Owns at most one audio binding per room and plays text on it.
pub struct VoiceOutputManager {
    synthesizer: Arc<dyn VoiceSynthesizer>,
    directory: Option<Arc<dyn VoiceDirectory>>,
    bindings: Mutex<Bindings>,
    tickets: AtomicU64,
}

impl VoiceOutputManager {
    /// Creates a manager with no bindings.
    #[must_use]
    pub fn new(synthesizer: Arc<dyn VoiceSynthesizer>) -> Self {
        Self {
            synthesizer,
            directory: None,
            bindings: Mutex::new(HashMap::new()),
            tickets: AtomicU64::new(0),
        }
    }

    /// Uses `directory` to find a replacement when a bound connection drops.
    #[must_use]
    pub fn with_directory(mut self, directory: Arc<dyn VoiceDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Binds `destination` to `connection`, replacing any previous binding.
    ///
    /// # Errors
    ///
    /// Returns `GameError::InvalidTransition` if the connection is not live.
    pub fn bind(
        &self,
        destination: &Destination,
        connection: &Arc<dyn VoiceConnection>,
    ) -> Result<(), GameError> {
        if !connection.is_connected() {
            return Err(GameError::invalid("You are not connected to a voice channel."));
        }
        self.lock().insert(
            destination.clone(),
            VoiceBinding {
                connection: Arc::downgrade(connection),
                latest_ticket: 0,
            },
        );
        info!(%destination, "voice bound");
        Ok(())
    }

    /// Removes the binding for `destination`, stopping any audio. Returns
    /// whether a binding existed.
    pub fn unbind(&self, destination: &Destination) -> bool {
        let Some(binding) = self.lock().remove(destination) else {
            return false;
        };
        if let Some(connection) = binding.connection.upgrade() {
            connection.stop();
        }
        info!(%destination, "voice unbound");
        true
    }

    /// Whether `destination` currently has a binding.
    pub fn is_bound(&self, destination: &Destination) -> bool {
        self.lock().contains_key(destination)
    }

    /// Synthesizes `text` and plays it in `destination`'s room, preempting
    /// whatever is playing there. Returns immediately; the work runs on its
    /// own task. Without a live connection this does nothing.
    pub fn speak(self: &Arc<Self>, destination: &Destination, text: String) -> JoinHandle<()> {
        let ticket = self.issue_ticket(destination);
        let manager = Arc::clone(self);
        let destination = destination.clone();

        tokio::spawn(async move {
            let Some(ticket) = ticket else {
                debug!(%destination, "no voice binding, skipping speech");
                return;
            };
            let live = manager.resolve(&mut manager.lock(), &destination).is_some();
            if !live {
                debug!(error = %GameError::VoiceUnavailable(destination.to_string()), "skipping speech");
                return;
            }

            let synthesizer = Arc::clone(&manager.synthesizer);
            let clip = match tokio::task::spawn_blocking(move || synthesizer.synthesize(&text)).await {
                Ok(Ok(clip)) => clip,
                Ok(Err(e)) => {
                    warn!(%destination, error = %e, "speech synthesis failed");
                    return;
                }
                Err(e) => {
                    warn!(%destination, error = %e, "speech synthesis task aborted");
                    return;
                }
            };

            manager.play_if_latest(&destination, ticket, clip);
        })
    }

    fn lock(&self) -> MutexGuard<'_, Bindings> {
        self.bindings.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn issue_ticket(&self, destination: &Destination) -> Option<u64> {
        let mut bindings = self.lock();
        let binding = bindings.get_mut(destination)?;
        let ticket = self.tickets.fetch_add(1, Ordering::Relaxed) + 1;
        binding.latest_ticket = ticket;
        Some(ticket)
    }

    fn play_if_latest(&self, destination: &Destination, ticket: u64, clip: AudioClip) {
        let mut bindings = self.lock();
        let Some(connection) = self.resolve(&mut bindings, destination) else {
            debug!(%destination, "voice connection gone before playback");
            return;
        };
        if bindings
            .get(destination)
            .is_none_or(|binding| binding.latest_ticket != ticket)
        {
            debug!(%destination, ticket, "speech superseded by a newer one");
            return;
        }

        if connection.is_playing() {
            connection.stop();
        }
        if let Err(e) = connection.play(clip) {
            warn!(%destination, error = %e, "voice playback failed");
        }
    }

    /// Finds the live connection for `destination`: the bound one if still
    /// connected, else the directory's current one. Drops the binding when
    /// neither is available.
    fn resolve(
        &self,
        bindings: &mut Bindings,
        destination: &Destination,
    ) -> Option<Arc<dyn VoiceConnection>> {
        let binding = bindings.get_mut(destination)?;
        if let Some(connection) = binding.connection.upgrade().filter(|c| c.is_connected()) {
            return Some(connection);
        }

        let replacement = self
            .directory
            .as_ref()
            .and_then(|directory| directory.connection_for(destination))
            .filter(|c| c.is_connected());
        if let Some(connection) = replacement {
            info!(%destination, "voice connection replaced, rebinding");
            binding.connection = Arc::downgrade(&connection);
            return Some(connection);
        }

        info!(%destination, "voice connection lost, unbinding");
        bindings.remove(destination);
        None
    }
}
