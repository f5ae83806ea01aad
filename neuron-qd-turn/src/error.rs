//! Errors raised by the orchestration loop.

use neuron_qd_archive::ArchiveError;
use neuron_qd_prompt::ParseError;
use neuron_qd_core::SenderError;
use thiserror::Error;

/// Errors raised by [`crate::run_turn`].
///
/// Transport and parse failures are recovered locally wherever the spec
/// says so (one retry on parse failure; the sender's own retry policy is
/// the caller's concern). What reaches here is what the loop gave up on.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum TurnError {
    /// No module was available to select for this turn.
    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// The sender failed on a call the loop did not retry further.
    #[error("sender error: {0}")]
    Sender(#[from] SenderError),

    /// The response failed to parse twice in a row (once, then once more
    /// after an appended clarification).
    #[error("parse failed after retry: {0}")]
    ParseFailedAfterRetry(ParseError),

    /// The tool loop ran `max_iterations` rounds without the model
    /// producing a final, non-tool-calling response.
    #[error("exceeded max tool iterations ({0})")]
    MaxIterationsExceeded(u32),
}

impl TurnError {
    /// Whether retrying the whole turn might succeed. Structural failures
    /// (archive empty, too many iterations) are not; a sender failure might
    /// be, mirroring `SenderError::is_retryable`.
    pub fn is_retryable(&self) -> bool {
        match self {
            TurnError::Sender(e) => e.is_retryable(),
            TurnError::Archive(_)
            | TurnError::ParseFailedAfterRetry(_)
            | TurnError::MaxIterationsExceeded(_) => false,
        }
    }
}
