//! Demo bootstrapping and the training-example type.

use neuron_qd_core::{Demo, Signature};
use serde_json::Value;
use std::collections::BTreeMap;

/// A single training pair: concrete inputs and the expected output fields.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingExample {
    /// Input field values, keyed by field name.
    pub inputs: BTreeMap<String, Value>,
    /// Expected output field values, keyed by field name.
    pub expected: BTreeMap<String, Value>,
}

impl TrainingExample {
    /// Construct a training example.
    pub fn new(inputs: BTreeMap<String, Value>, expected: BTreeMap<String, Value>) -> Self {
        Self { inputs, expected }
    }

    /// Whether every present field validates against `signature`'s
    /// declared kind. Fields the example omits are not required here:
    /// that's what makes a demo a *partial* mapping.
    fn valid_for(&self, signature: &Signature) -> bool {
        signature
            .inputs
            .iter()
            .all(|f| self.inputs.get(&f.name).is_none_or(|v| f.kind.validate(v)))
            && signature
                .outputs
                .iter()
                .all(|f| self.expected.get(&f.name).is_none_or(|v| f.kind.validate(v)))
    }

    /// Merge `inputs` and `expected` into a single field-name-to-value demo.
    fn to_demo(&self) -> Demo {
        let mut demo = Demo::new();
        demo.extend(self.inputs.clone());
        demo.extend(self.expected.clone());
        demo
    }
}

/// Draw up to `k_demos` valid training pairs and render them as demos.
///
/// Invalid examples (a present field that fails its signature predicate)
/// are silently skipped rather than rejecting the whole bootstrap attempt.
/// If fewer than `k_demos` valid examples exist, every valid one is used.
pub fn bootstrap_demos(
    training: &[TrainingExample],
    signature: &Signature,
    k_demos: usize,
) -> Vec<Demo> {
    training
        .iter()
        .filter(|ex| ex.valid_for(signature))
        .take(k_demos)
        .map(TrainingExample::to_demo)
        .collect()
}
