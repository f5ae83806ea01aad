//! Prompt rendering and response parsing for typed modules.
//!
//! Both halves are pure, suspension-free computation: [`render`] and
//! [`parse`] never touch the network or a clock, matching the spec's
//! requirement that the renderer and parser be safe to call from inside a
//! single-threaded orchestration loop without yielding.

mod parser;
mod renderer;

pub use parser::{parse, ParseError, ParseOutcome};
pub use renderer::render;
