//! The single-worker request dispatcher.
//!
//! Producers enqueue without blocking. One worker task pops requests in
//! FIFO order and runs each against the session state machine: plan the
//! turn, generate on the blocking pool under a timeout, record, deliver.
//! Administrative operations drain the queue before touching the session
//! so they never race a generation call.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dungeon_core::clock::Clock;
use dungeon_core::destination::Destination;
use dungeon_core::engine::GenerationEngine;
use dungeon_core::error::{EngineError, GameError};
use dungeon_core::outbox::Outbox;
use dungeon_core::repository::StoryRepository;
use dungeon_core::voice::VoiceConnection;
use dungeon_session::application::command_handlers;
use dungeon_session::application::query_handlers::{self, SessionView};
use dungeon_session::domain::state_machine::{GenerationPlan, SessionStateMachine, StorySettings};
use dungeon_voice::VoiceOutputManager;
use tokio::sync::{Mutex, Semaphore, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::format::{discarded_message, escape_markdown, failure_message, turn_message};
use crate::request::Request;

/// Default bound on a single generation call.
pub const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(180);

/// Tunables for a dispatcher instance.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// How long one generation call may take, including waiting for a
    /// cancelled earlier call to release the engine.
    pub generation_timeout: Duration,
    /// Settings for the sessions the state machine creates.
    pub story: StorySettings,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            generation_timeout: DEFAULT_GENERATION_TIMEOUT,
            story: StorySettings::default(),
        }
    }
}

/// The collaborators a dispatcher is built from.
pub struct DispatcherParts {
    /// The narrative generator.
    pub engine: Arc<dyn GenerationEngine>,
    /// Where messages for rooms go.
    pub outbox: Arc<dyn Outbox>,
    /// Story persistence.
    pub repository: Arc<dyn StoryRepository>,
    /// Voice mirroring, if enabled.
    pub voice: Option<Arc<VoiceOutputManager>>,
    /// Time source for request stamps.
    pub clock: Arc<dyn Clock>,
}

struct Queued {
    request: Request,
    epoch: u64,
}

struct Inner {
    machine: Mutex<SessionStateMachine>,
    engine: Arc<dyn GenerationEngine>,
    /// Single permit: at most one engine call in flight, even while a
    /// timed-out call is still winding down.
    engine_slot: Arc<Semaphore>,
    outbox: Arc<dyn Outbox>,
    repository: Arc<dyn StoryRepository>,
    voice: Option<Arc<VoiceOutputManager>>,
    clock: Arc<dyn Clock>,
    generation_timeout: Duration,
    /// Requests enqueued but not yet finished.
    outstanding: watch::Sender<usize>,
    /// The session as of the last completed turn or administrative
    /// operation. Readable while a generation holds `machine`.
    view: watch::Sender<Option<SessionView>>,
    /// Bumped by restart and new game; requests from older epochs are
    /// skipped.
    epoch: AtomicU64,
    shutdown: CancellationToken,
}

/// Handle to a running dispatcher. Cheap to clone; all clones share the
/// same queue, worker and session.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
    queue: mpsc::UnboundedSender<Queued>,
}

impl Dispatcher {
    /// Builds a dispatcher and starts its worker on the current runtime.
    #[must_use]
    pub fn spawn(config: DispatcherConfig, parts: DispatcherParts) -> (Self, JoinHandle<()>) {
        let (queue, receiver) = mpsc::unbounded_channel();
        let (outstanding, _) = watch::channel(0);
        let (view, _) = watch::channel(None);
        let inner = Arc::new(Inner {
            machine: Mutex::new(SessionStateMachine::new(config.story)),
            engine: parts.engine,
            engine_slot: Arc::new(Semaphore::new(1)),
            outbox: parts.outbox,
            repository: parts.repository,
            voice: parts.voice,
            clock: parts.clock,
            generation_timeout: config.generation_timeout,
            outstanding,
            view,
            epoch: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
        });
        let worker = tokio::spawn(run_worker(Arc::clone(&inner), receiver));
        (Self { inner, queue }, worker)
    }

    /// Builds a request for `text` and enqueues it.
    ///
    /// # Errors
    ///
    /// Returns `GameError::ShuttingDown` once the dispatcher has stopped.
    pub fn submit(
        &self,
        destination: Destination,
        text: impl Into<String>,
    ) -> Result<Request, GameError> {
        let request = Request::new(destination, text, self.inner.clock.as_ref());
        self.enqueue(request.clone())?;
        Ok(request)
    }

    /// Appends `request` to the queue. Never blocks.
    ///
    /// # Errors
    ///
    /// Returns `GameError::ShuttingDown` once the dispatcher has stopped.
    pub fn enqueue(&self, request: Request) -> Result<(), GameError> {
        if self.inner.shutdown.is_cancelled() {
            return Err(GameError::ShuttingDown);
        }
        self.inner.outstanding.send_modify(|n| *n += 1);
        let queued = Queued {
            epoch: self.inner.epoch.load(Ordering::SeqCst),
            request,
        };
        if self.queue.send(queued).is_err() {
            self.inner
                .outstanding
                .send_modify(|n| *n = n.saturating_sub(1));
            return Err(GameError::ShuttingDown);
        }
        Ok(())
    }

    /// Number of requests enqueued but not yet finished.
    #[must_use]
    pub fn pending(&self) -> usize {
        *self.inner.outstanding.borrow()
    }

    /// Waits until the queue is empty and the in-flight request, if any, has
    /// been delivered. Returns immediately after shutdown.
    ///
    /// New requests may still be enqueued while waiting; callers needing
    /// strict exclusivity must stop their producers first.
    pub async fn drain(&self) {
        let mut idle = self.inner.outstanding.subscribe();
        tokio::select! {
            _ = idle.wait_for(|n| *n == 0) => {}
            () = self.inner.shutdown.cancelled() => {}
        }
    }

    /// Undoes the latest turn and posts the text now current.
    ///
    /// # Errors
    ///
    /// Returns `GameError::InvalidTransition` when there is nothing to undo.
    pub async fn revert(&self, destination: &Destination) -> Result<String, GameError> {
        self.drain().await;
        let shown = {
            let mut machine = self.inner.machine.lock().await;
            let shown = machine.revert()?;
            self.inner.publish(&machine);
            shown
        };
        self.inner
            .outbox
            .deliver(destination, escape_markdown(&shown))
            .await;
        Ok(shown)
    }

    /// Clears the transcript back to the preamble. Actions still queued for
    /// the old timeline are dropped.
    ///
    /// # Errors
    ///
    /// Returns `GameError::InvalidTransition` when no story is in progress.
    pub async fn restart(&self, destination: &Destination) -> Result<String, GameError> {
        self.inner.discard_queued();
        self.drain().await;
        let preamble = {
            let mut machine = self.inner.machine.lock().await;
            let preamble = machine.restart()?;
            self.inner.publish(&machine);
            preamble
        };
        self.inner
            .outbox
            .deliver(destination, "Restarted game from beginning".to_owned())
            .await;
        if !preamble.is_empty() {
            self.inner
                .outbox
                .deliver(destination, escape_markdown(&preamble))
                .await;
        }
        Ok(preamble)
    }

    /// Discards the story. Actions still queued are dropped; the next
    /// action starts a new story.
    pub async fn new_game(&self, destination: &Destination) {
        self.inner.discard_queued();
        self.drain().await;
        {
            let mut machine = self.inner.machine.lock().await;
            machine.new_game();
            self.inner.publish(&machine);
        }
        self.inner
            .outbox
            .deliver(
                destination,
                "Started a new game. Send an action to begin.".to_owned(),
            )
            .await;
    }

    /// Saves the story and posts the identifier to load it with.
    ///
    /// # Errors
    ///
    /// Returns `GameError::InvalidTransition` when there is no story or
    /// uploads are disabled, `GameError::Storage` when storage fails.
    pub async fn save(&self, destination: &Destination) -> Result<String, GameError> {
        let id = {
            let mut machine = self.inner.machine.lock().await;
            let id =
                command_handlers::handle_save(&mut machine, self.inner.repository.as_ref())
                    .await?;
            self.inner.publish(&machine);
            id
        };
        self.inner.announce_saved(destination, &id).await;
        Ok(id)
    }

    /// Replaces the story with the saved one and posts it.
    ///
    /// # Errors
    ///
    /// Returns `GameError::InvalidTransition` when loading is disabled,
    /// `GameError::Storage` when storage fails.
    pub async fn load(&self, destination: &Destination, id: &str) -> Result<String, GameError> {
        self.drain().await;
        let story = {
            let mut machine = self.inner.machine.lock().await;
            let story =
                command_handlers::handle_load(&mut machine, id, self.inner.repository.as_ref())
                    .await?;
            self.inner.publish(&machine);
            story
        };
        self.inner
            .outbox
            .deliver(destination, "Loading Game...".to_owned())
            .await;
        self.inner
            .outbox
            .deliver(destination, escape_markdown(&story))
            .await;
        Ok(story)
    }

    /// Saves if enabled, then stops the dispatcher. Queued requests are
    /// abandoned.
    ///
    /// # Errors
    ///
    /// Returns `GameError::Storage` if the final save fails; the dispatcher
    /// keeps running in that case.
    pub async fn exit(&self, destination: &Destination) -> Result<Option<String>, GameError> {
        let saved = {
            let mut machine = self.inner.machine.lock().await;
            let saved =
                command_handlers::handle_exit(&mut machine, self.inner.repository.as_ref())
                    .await?;
            self.inner.publish(&machine);
            saved
        };
        if let Some(id) = &saved {
            self.inner.announce_saved(destination, id).await;
        }
        self.inner
            .outbox
            .deliver(destination, "Exiting game...".to_owned())
            .await;
        info!(%destination, "exit requested, shutting down");
        self.inner.shutdown.cancel();
        Ok(saved)
    }

    /// Mirrors future results for `destination` to `connection`.
    ///
    /// # Errors
    ///
    /// Returns `GameError::InvalidTransition` when voice output is not
    /// configured or the connection is not live.
    pub async fn join_voice(
        &self,
        destination: &Destination,
        connection: &Arc<dyn VoiceConnection>,
    ) -> Result<(), GameError> {
        self.voice()?.bind(destination, connection)?;
        self.inner
            .outbox
            .deliver(destination, "Joined voice.".to_owned())
            .await;
        Ok(())
    }

    /// Stops mirroring results for `destination`.
    ///
    /// # Errors
    ///
    /// Returns `GameError::InvalidTransition` when voice output is not
    /// configured or the room has no binding.
    pub async fn leave_voice(&self, destination: &Destination) -> Result<(), GameError> {
        if !self.voice()?.unbind(destination) {
            return Err(GameError::invalid("I am not in a voice channel."));
        }
        self.inner
            .outbox
            .deliver(destination, "Left voice.".to_owned())
            .await;
        Ok(())
    }

    /// The session as of the last finished turn or administrative
    /// operation. Never waits for an in-flight generation; a turn still
    /// running is not reflected until it completes.
    #[must_use]
    pub fn session_view(&self) -> Option<SessionView> {
        self.inner.view.borrow().clone()
    }

    /// Cancelled when the dispatcher stops, e.g. after `exit`.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }

    fn voice(&self) -> Result<&Arc<VoiceOutputManager>, GameError> {
        self.inner
            .voice
            .as_ref()
            .ok_or_else(|| GameError::invalid("Voice output is not enabled."))
    }
}

impl Inner {
    fn publish(&self, machine: &SessionStateMachine) {
        self.view
            .send_replace(query_handlers::current_session(machine));
    }

    fn discard_queued(&self) {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        info!(epoch, "discarding queued requests");
    }

    async fn announce_saved(&self, destination: &Destination, id: &str) {
        self.outbox
            .deliver(destination, "Game saved.".to_owned())
            .await;
        self.outbox
            .deliver(
                destination,
                format!("To load the game, type 'load' and enter the following ID: {id}"),
            )
            .await;
    }

    /// One unit of work. The session lock is held from planning through
    /// recording so nothing else mutates the session mid-turn.
    async fn process(&self, request: Request) {
        let started = Instant::now();
        let queued_ms = (self.clock.now() - request.submitted_at).num_milliseconds();
        info!(
            correlation_id = %request.correlation_id,
            destination = %request.destination,
            queued_ms,
            "processing request"
        );

        let mut machine = self.machine.lock().await;
        let turn = machine.begin_turn(&request.text);
        let action = turn.action.clone();
        let outcome = match self.generate(turn.plan.clone()).await {
            Ok(output) => machine.complete_turn(turn, output),
            Err(e) => Err(e),
        };
        self.publish(&machine);
        drop(machine);

        let elapsed_ms = started.elapsed().as_millis();
        match outcome {
            Ok(result) => {
                info!(
                    correlation_id = %request.correlation_id,
                    elapsed_ms,
                    "request completed"
                );
                self.outbox
                    .deliver(&request.destination, turn_message(&action, &result))
                    .await;
                if let Some(voice) = &self.voice {
                    if voice.is_bound(&request.destination) {
                        drop(voice.speak(&request.destination, result));
                    }
                }
            }
            Err(e) => {
                error!(
                    correlation_id = %request.correlation_id,
                    destination = %request.destination,
                    text = %request.text,
                    elapsed_ms,
                    error = %e,
                    "request failed"
                );
                self.outbox
                    .deliver(&request.destination, failure_message(&action, &e))
                    .await;
            }
        }
    }

    /// Runs `plan` on the blocking pool under the generation timeout. The
    /// call gets its own cancellation token, a child of the shutdown token,
    /// which is cancelled when the timeout fires. The engine slot stays taken
    /// until the blocking call has actually returned.
    async fn generate(&self, plan: GenerationPlan) -> Result<String, GameError> {
        let engine = Arc::clone(&self.engine);
        let slot = Arc::clone(&self.engine_slot);
        let cancel = self.shutdown.child_token();
        let call_cancel = cancel.clone();
        let call = async move {
            let permit = slot
                .acquire_owned()
                .await
                .map_err(|_| GameError::ShuttingDown)?;
            tokio::task::spawn_blocking(move || {
                let _permit = permit;
                plan.generate(engine.as_ref(), &call_cancel)
            })
            .await
            .map_err(|e| EngineError(format!("generation task failed: {e}")))?
            .map_err(GameError::from)
        };

        match tokio::time::timeout(self.generation_timeout, call).await {
            Ok(outcome) => outcome,
            Err(_) => {
                cancel.cancel();
                warn!(
                    timeout_ms = self.generation_timeout.as_millis(),
                    "generation timed out, cancelling engine call"
                );
                Err(GameError::Timeout(self.generation_timeout))
            }
        }
    }

    async fn report_discarded(&self, request: &Request) {
        warn!(
            correlation_id = %request.correlation_id,
            destination = %request.destination,
            "dropping request queued before reset"
        );
        self.outbox
            .deliver(&request.destination, discarded_message(&request.text))
            .await;
    }
}

async fn run_worker(inner: Arc<Inner>, mut queue: mpsc::UnboundedReceiver<Queued>) {
    info!("dispatcher worker started");
    loop {
        let next = tokio::select! {
            biased;
            () = inner.shutdown.cancelled() => break,
            next = queue.recv() => next,
        };
        let Some(Queued { request, epoch }) = next else {
            break;
        };

        if epoch < inner.epoch.load(Ordering::SeqCst) {
            inner.report_discarded(&request).await;
        } else {
            inner.process(request).await;
        }
        inner.outstanding.send_modify(|n| *n = n.saturating_sub(1));
    }

    queue.close();
    inner.outstanding.send_replace(0);
    info!("dispatcher worker stopped");
}
