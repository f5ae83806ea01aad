#![deny(missing_docs)]
//! Shared toolkit for building [`layer0::Operator`] implementations.
//!
//! This crate doesn't implement `Operator` itself — that's
//! `neuron-op-react::ReactOperator` and `neuron-op-single-shot::SingleShotOperator`.
//! It provides the pieces they're built from: a provider-agnostic request/response
//! shape, a context-compaction seam, and the wire-level content conversions
//! between `layer0::Content` and this crate's message types.
//!
//! Key traits defined here:
//! - [`Provider`] — LLM provider interface (not object-safe, uses RPITIT)
//! - [`ContextStrategy`] — context window management

pub mod config;
pub mod context;
pub mod convert;
pub mod provider;
pub mod types;

// Re-exports
pub use config::NeuronTurnConfig;
pub use context::{ContextStrategy, NoCompaction};
pub use convert::{
    content_block_to_part, content_part_to_block, content_to_parts, content_to_user_message,
    parts_to_content,
};
pub use provider::{Provider, ProviderError};
pub use types::*;
