//! Generation engine boundary.

pub use tokio_util::sync::CancellationToken;

use crate::error::EngineError;

/// The external narrative generator.
///
/// Both calls block for seconds to minutes and the implementation is assumed
/// non-reentrant: callers must guarantee at most one call is in flight across
/// the whole process. Callers run these on a blocking thread, never on the
/// async executor.
///
/// Each call receives a token that is cancelled once the caller has given up
/// on it, e.g. when the generation timeout fires. Implementations should stop
/// work promptly when it is cancelled; the caller keeps the engine reserved
/// until the call returns.
pub trait GenerationEngine: Send + Sync {
    /// Opens a new story. The returned text may begin with an echo of
    /// `prompt`.
    ///
    /// # Errors
    ///
    /// Returns `EngineError` if the generator fails or the call was
    /// cancelled.
    fn start_story(
        &self,
        prompt: &str,
        context: &str,
        cancel: &CancellationToken,
    ) -> Result<String, EngineError>;

    /// Continues the story from `prompt` and returns the continuation.
    ///
    /// # Errors
    ///
    /// Returns `EngineError` if the generator fails or the call was
    /// cancelled.
    fn act(&self, prompt: &str, cancel: &CancellationToken) -> Result<String, EngineError>;
}
