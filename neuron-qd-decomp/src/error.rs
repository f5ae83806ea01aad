//! Errors for the decomposition engine.

use crate::tree::NodeId;
use thiserror::Error;

/// Which dimension an explosion was detected in, in the spec's fixed
/// detection-priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExplosionReason {
    /// Tree depth exceeded `max_depth`.
    Depth,
    /// Tree breadth exceeded `max_breadth`.
    Breadth,
    /// Accumulated cost exceeded `max_cost`.
    Cost,
    /// Accumulated context size exceeded `max_context`.
    Context,
    /// Success rate fell below `min_success_rate`.
    LowSuccess,
}

impl std::fmt::Display for ExplosionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExplosionReason::Depth => "depth",
            ExplosionReason::Breadth => "breadth",
            ExplosionReason::Cost => "cost",
            ExplosionReason::Context => "context",
            ExplosionReason::LowSuccess => "low-success",
        };
        f.write_str(s)
    }
}

/// Errors raised by the decomposition engine.
#[non_exhaustive]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecompError {
    /// Referenced a node id that doesn't exist in the tree.
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    /// `rollback` was called with an empty checkpoint stack.
    #[error("no-checkpoint")]
    NoCheckpoint,

    /// An explosion was detected and no checkpoint remained to roll back to.
    #[error("explosion:{0}")]
    Explosion(ExplosionReason),
}
