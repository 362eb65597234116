//! Process-backed generation engine.

use std::io::ErrorKind;
use std::process::{Output, Stdio};

use dungeon_core::engine::{CancellationToken, GenerationEngine};
use dungeon_core::error::EngineError;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::runtime::Handle;
use tracing::{debug, warn};

/// One generation job, written as JSON to the command's stdin.
#[derive(Debug, Serialize)]
struct Job<'a> {
    mode: &'static str,
    prompt: &'a str,
    context: &'a str,
}

/// Runs a shell command once per generation call.
///
/// The command receives a JSON job `{mode, prompt, context}` on stdin and
/// answers with the continuation on stdout. A non-zero exit is a failure.
/// Stdin is fed while stdout is read, so large prompts cannot wedge the
/// pipes, and the process is killed as soon as the call is cancelled.
///
/// Calls must come from a blocking thread of a Tokio runtime, e.g. inside
/// `spawn_blocking`; the process is driven on that runtime.
#[derive(Debug, Clone)]
pub struct CommandEngine {
    command: String,
}

impl CommandEngine {
    /// Creates an engine that runs `command` through `sh -c`.
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    fn run(&self, job: &Job<'_>, cancel: &CancellationToken) -> Result<String, EngineError> {
        let payload =
            serde_json::to_vec(job).map_err(|e| EngineError(format!("encoding job: {e}")))?;
        let runtime = Handle::try_current()
            .map_err(|e| EngineError(format!("engine needs a tokio runtime: {e}")))?;

        let output = runtime.block_on(self.execute(payload, cancel))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(status = %output.status, stderr = %stderr.trim(), "engine command failed");
            return Err(EngineError(format!(
                "engine exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout)
            .trim_end_matches(['\r', '\n'])
            .to_owned();
        debug!(mode = job.mode, len = text.len(), "engine answered");
        Ok(text)
    }

    async fn execute(
        &self,
        payload: Vec<u8>,
        cancel: &CancellationToken,
    ) -> Result<Output, EngineError> {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .kill_on_drop(true)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| EngineError(format!("starting {:?}: {e}", self.command)))?;

        let stdin = child.stdin.take();
        let feed = async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(&payload).await?;
                stdin.shutdown().await?;
            }
            Ok::<(), std::io::Error>(())
        };
        let finished = async move { tokio::join!(feed, child.wait_with_output()) };

        // Dropping `finished` drops the child, which kills it.
        let (fed, output) = tokio::select! {
            joined = finished => joined,
            () = cancel.cancelled() => {
                warn!(command = %self.command, "engine call cancelled, killing process");
                return Err(EngineError("engine call cancelled".to_owned()));
            }
        };

        // The command may answer without reading its input.
        if let Err(e) = fed
            && e.kind() != ErrorKind::BrokenPipe
        {
            return Err(EngineError(format!("writing job: {e}")));
        }
        output.map_err(|e| EngineError(format!("waiting for engine: {e}")))
    }
}

impl GenerationEngine for CommandEngine {
    fn start_story(
        &self,
        prompt: &str,
        context: &str,
        cancel: &CancellationToken,
    ) -> Result<String, EngineError> {
        self.run(
            &Job {
                mode: "start",
                prompt,
                context,
            },
            cancel,
        )
    }

    fn act(&self, prompt: &str, cancel: &CancellationToken) -> Result<String, EngineError> {
        self.run(
            &Job {
                mode: "act",
                prompt,
                context: "",
            },
            cancel,
        )
    }
}
