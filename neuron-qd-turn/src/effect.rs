//! Declared side-effects. Mirroring `layer0`'s effect-not-execution boundary,
//! the orchestration loop never mutates session memory or delegates to
//! another sub-agent directly from inside [`crate::run_turn`] — it returns
//! these, and the calling layer decides when and how to apply them. This
//! keeps the loop testable against a fake effect-applier instead of a real
//! memory store or scheduler.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A side-effect declared by a turn, for the calling layer to execute.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Effect {
    /// Write a value into session memory.
    WriteMemory {
        /// The memory key to write.
        key: String,
        /// The value to store.
        value: Value,
    },

    /// Ask the scheduler (`neuron-qd-subagent`) to spawn a sub-agent.
    Delegate {
        /// The prompt to hand the sub-agent.
        prompt: String,
        /// The profile to constrain the sub-agent's tool access to.
        profile: neuron_qd_core::Profile,
    },

    /// Append an eval record once the turn completes.
    RecordEval(crate::eval::EvalRecord),
}

/// The tool names that produce an [`Effect`] instead of being dispatched
/// through the tool registry. Modeled on `neuron-op-react`'s
/// `EFFECT_TOOL_NAMES` list, narrowed to this domain's effect set.
pub const EFFECT_TOOL_NAMES: &[&str] = &["write_memory", "delegate"];
