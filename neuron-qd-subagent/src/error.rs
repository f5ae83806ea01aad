//! Scheduler error type.

use thiserror::Error;

/// Errors raised by the sub-agent scheduler.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// No sub-agent is registered under this id.
    #[error("sub-agent not found: {0}")]
    NotFound(String),

    /// The worker reported a failure (including `cancelled` and a caught panic).
    #[error("worker error: {0}")]
    Worker(String),

    /// Catch-all.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}
