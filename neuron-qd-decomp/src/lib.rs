//! Geometric decomposition engine: a bounded, mutable task tree with a 5D
//! explosion detector and a checkpoint/rollback stack for backing out of
//! runaway expansion.

mod error;
mod limits;
mod state;
mod tree;

pub use error::{DecompError, ExplosionReason};
pub use limits::{limits_for_priority, DecompPriority, Limits};
pub use state::{DecompOp, DecompStep, DecompositionState};
pub use tree::{Node, NodeId, NodeStatus, Tree};
