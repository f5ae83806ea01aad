//! Core types shared by neuron's quality-diversity subsystem: typed module
//! signatures, the module value type, performance phenotypes, and the
//! protocol traits ([`Sender`], tool security levels, sub-agent profiles)
//! that the rest of the `neuron-qd-*` crates are built against.
//!
//! Nothing in this crate talks to a network or a filesystem. The [`Sender`]
//! trait is the seam where an external LLM transport plugs in; this crate
//! only defines its shape.

pub mod error;
pub mod phenotype;
pub mod proto;
pub mod signature;

pub use error::CoreError;
pub use phenotype::{DecompositionPhenotype, Phenotype};
pub use proto::{
    Profile, RunMeta, RunResult, SecurityLevel, Sender, SenderError, SenderResponse,
};
pub use signature::{FieldKind, SigField, Signature};

mod module;
pub use module::{InstructionVersion, Module, Strategy};
