//! Error types for the core module/signature/phenotype layer.

use thiserror::Error;

/// Errors raised while building or validating core types.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum CoreError {
    /// Two fields on the same side of a signature (inputs or outputs) share a name.
    #[error("duplicate field `{name}` on signature {side} side")]
    DuplicateField {
        /// Which side of the signature the collision was found on.
        side: &'static str,
        /// The colliding field name.
        name: String,
    },

    /// Catch-all.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}
