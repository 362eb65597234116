//! Test engine — an instrumented `GenerationEngine` for tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use dungeon_core::engine::{CancellationToken, GenerationEngine};
use dungeon_core::error::EngineError;

/// One observed call into the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    /// A `start_story` call.
    Start {
        /// The prompt passed in.
        prompt: String,
        /// The story context passed in.
        context: String,
    },
    /// An `act` call.
    Act {
        /// The prompt passed in.
        prompt: String,
    },
}

impl EngineCall {
    /// The prompt of either call kind.
    #[must_use]
    pub fn prompt(&self) -> &str {
        match self {
            Self::Start { prompt, .. } | Self::Act { prompt } => prompt,
        }
    }

    /// The last non-empty line of the prompt, i.e. the framed action that
    /// triggered the call.
    #[must_use]
    pub fn action_line(&self) -> &str {
        last_line(self.prompt())
    }
}

fn last_line(prompt: &str) -> &str {
    prompt
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .unwrap_or("")
}

/// An engine that records every call and tracks how many calls overlap.
///
/// Replies come from a scripted queue, falling back to `"result N"` where
/// `N` counts calls from 1. Calls whose action line contains a configured
/// needle can be slowed down or made to fail. A slowed call gives up as
/// soon as its cancellation token fires.
#[derive(Debug, Default)]
pub struct ScriptedEngine {
    replies: Mutex<VecDeque<String>>,
    echo_on_start: bool,
    delays: Vec<(String, Duration)>,
    failures: Vec<String>,
    calls: Mutex<Vec<EngineCall>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    completed: AtomicUsize,
    cancelled: AtomicUsize,
}

impl ScriptedEngine {
    /// Create an engine that answers every call with `"result N"`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer calls with `replies` in order before falling back.
    #[must_use]
    pub fn with_replies<I, S>(self, replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.replies.lock().unwrap() = replies.into_iter().map(Into::into).collect();
        self
    }

    /// Prefix every `start_story` reply with the prompt, like a generator
    /// that echoes its input.
    #[must_use]
    pub fn echoing_start(mut self) -> Self {
        self.echo_on_start = true;
        self
    }

    /// Sleep for `delay` on calls whose action line contains `needle`,
    /// unless the call is cancelled first.
    #[must_use]
    pub fn with_delay_when(mut self, needle: &str, delay: Duration) -> Self {
        self.delays.push((needle.to_owned(), delay));
        self
    }

    /// Fail calls whose action line contains `needle`.
    #[must_use]
    pub fn failing_when(mut self, needle: &str) -> Self {
        self.failures.push(needle.to_owned());
        self
    }

    /// Returns a snapshot of all calls, in the order they entered.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().unwrap().clone()
    }

    /// The highest number of calls ever observed running at once.
    pub fn max_concurrency(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Number of calls that have returned, successfully or not.
    pub fn completed_calls(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Number of calls that stopped early because they were cancelled.
    pub fn cancelled_calls(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn run(&self, call: EngineCall, cancel: &CancellationToken) -> Result<String, EngineError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let action = call.action_line().to_owned();
        let ordinal = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(call);
            calls.len()
        };

        let interrupted = self
            .delays
            .iter()
            .find(|(n, _)| action.contains(n.as_str()))
            .is_some_and(|(_, delay)| !sleep_unless_cancelled(*delay, cancel));

        let outcome = if interrupted {
            self.cancelled.fetch_add(1, Ordering::SeqCst);
            Err(EngineError(format!("cancelled while generating {action:?}")))
        } else if self.failures.iter().any(|n| action.contains(n.as_str())) {
            Err(EngineError(format!("model crashed on {action:?}")))
        } else {
            Ok(self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| format!("result {ordinal}")))
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.completed.fetch_add(1, Ordering::SeqCst);
        outcome
    }
}

impl GenerationEngine for ScriptedEngine {
    fn start_story(
        &self,
        prompt: &str,
        context: &str,
        cancel: &CancellationToken,
    ) -> Result<String, EngineError> {
        let reply = self.run(
            EngineCall::Start {
                prompt: prompt.to_owned(),
                context: context.to_owned(),
            },
            cancel,
        )?;
        if self.echo_on_start {
            Ok(format!("{prompt}{reply}"))
        } else {
            Ok(reply)
        }
    }

    fn act(&self, prompt: &str, cancel: &CancellationToken) -> Result<String, EngineError> {
        self.run(
            EngineCall::Act {
                prompt: prompt.to_owned(),
            },
            cancel,
        )
    }
}

/// Sleeps in short slices until `delay` has passed. Returns `false` if
/// `cancel` fired first.
fn sleep_unless_cancelled(delay: Duration, cancel: &CancellationToken) -> bool {
    const SLICE: Duration = Duration::from_millis(5);
    let deadline = Instant::now() + delay;
    loop {
        if cancel.is_cancelled() {
            return false;
        }
        let left = deadline.saturating_duration_since(Instant::now());
        if left.is_zero() {
            return true;
        }
        std::thread::sleep(left.min(SLICE));
    }
}
