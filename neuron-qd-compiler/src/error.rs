//! Errors for the MAP-Elites compiler.

use thiserror::Error;

/// Errors raised by [`crate::compile`].
///
/// Per-generation and per-example failures (sender errors, meta-optimize
/// failures, bad bootstrap examples) are recoverable by design and never
/// surface here — see the spec's failure semantics. Only preconditions that
/// would make the whole run meaningless are fatal.
#[non_exhaustive]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompilerError {
    /// The training set was empty; there is nothing to evaluate seeds or
    /// children against.
    #[error("training set is empty")]
    EmptyTrainingSet,
}
