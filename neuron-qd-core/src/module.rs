//! Modules: a signature plus execution strategy, instructions, demos and params.

use crate::signature::Signature;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// How a module asks the model to answer: directly, or with a reasoning
/// pseudo-field prepended to the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Ask for the declared outputs directly.
    Predict,
    /// Ask for a `thought` field before the declared outputs.
    ChainOfThought,
}

/// A single version of a module's instructions, as retained in its history.
///
/// Evolution never mutates `instructions` in place; it appends a new
/// [`InstructionVersion`] and repoints the module's live field. This keeps
/// every evolved prompt inspectable and revertible independent of whichever
/// archive bin currently holds the module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructionVersion {
    /// Monotonically increasing version id, starting at 0 for the seed instructions.
    pub version: u64,
    /// The instructions text at this version.
    pub instructions: String,
}

/// A few-shot demonstration: a mapping from field name to example value,
/// covering any subset of a signature's fields.
pub type Demo = BTreeMap<String, Value>;

/// A signature-typed LLM module: strategy, instructions, demos and params.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    /// Stable module identity. Archives and equality checks key on this,
    /// not on structural equality of the other fields.
    pub id: String,
    /// The module's typed in/out contract.
    pub signature: Signature,
    /// Prediction strategy.
    pub strategy: Strategy,
    /// Current instructions text (the most recent entry of `history`).
    pub instructions: String,
    /// Ordered few-shot demonstrations.
    pub demos: Vec<Demo>,
    /// Free-form parameters; must carry at least `temperature` by convention.
    pub params: BTreeMap<String, Value>,
    /// Append-only version history of `instructions`.
    pub history: Vec<InstructionVersion>,
}

impl Module {
    /// Build a `Predict`-strategy module with default id `Predict/<sig.name>`.
    pub fn predict(signature: Signature, instructions: impl Into<String>) -> Self {
        Self::new(signature, Strategy::Predict, instructions)
    }

    /// Build a `ChainOfThought`-strategy module with default id `CoT/<sig.name>`.
    pub fn chain_of_thought(signature: Signature, instructions: impl Into<String>) -> Self {
        Self::new(signature, Strategy::ChainOfThought, instructions)
    }

    fn new(signature: Signature, strategy: Strategy, instructions: impl Into<String>) -> Self {
        let instructions = instructions.into();
        let prefix = match strategy {
            Strategy::Predict => "Predict",
            Strategy::ChainOfThought => "CoT",
        };
        let id = format!("{prefix}/{}", signature.name);
        let mut temperature_params = BTreeMap::new();
        temperature_params.insert("temperature".to_string(), Value::from(0.0));
        Self {
            id,
            signature,
            strategy,
            instructions: instructions.clone(),
            demos: Vec::new(),
            params: temperature_params,
            history: vec![InstructionVersion {
                version: 0,
                instructions,
            }],
        }
    }

    /// Whether `self` and `other` refer to the same module identity.
    ///
    /// Archives compare modules this way rather than by full structural
    /// equality, since a champion's demos/instructions evolve while its
    /// identity (and archive slot) stays put.
    pub fn same_identity(&self, other: &Module) -> bool {
        self.id == other.id
    }

    /// Produce a new module with evolved instructions, appending a version
    /// to the history rather than discarding the prior text.
    pub fn with_evolved_instructions(&self, new_instructions: impl Into<String>) -> Self {
        let new_instructions = new_instructions.into();
        let next_version = self.history.last().map(|v| v.version + 1).unwrap_or(0);
        let mut history = self.history.clone();
        history.push(InstructionVersion {
            version: next_version,
            instructions: new_instructions.clone(),
        });
        Self {
            instructions: new_instructions,
            history,
            ..self.clone()
        }
    }

    /// Produce a new module with the given demos attached.
    pub fn with_demos(&self, demos: Vec<Demo>) -> Self {
        Self {
            demos,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::{FieldKind, SigField};

    fn sig() -> Signature {
        Signature::new(
            "summarize",
            vec![SigField::new("text", FieldKind::String)],
            vec![SigField::new("summary", FieldKind::String)],
        )
        .unwrap()
    }

    #[test]
    fn default_ids_follow_strategy() {
        let p = Module::predict(sig(), "be brief");
        assert_eq!(p.id, "Predict/summarize");
        let c = Module::chain_of_thought(sig(), "be brief");
        assert_eq!(c.id, "CoT/summarize");
    }

    #[test]
    fn evolved_instructions_append_to_history() {
        let m = Module::predict(sig(), "v0");
        let m2 = m.with_evolved_instructions("v1");
        assert_eq!(m2.instructions, "v1");
        assert_eq!(m2.history.len(), 2);
        assert_eq!(m2.history[0].instructions, "v0");
        assert_eq!(m2.history[1].version, 1);
        // identity is preserved across evolution
        assert!(m.same_identity(&m2));
    }
}
