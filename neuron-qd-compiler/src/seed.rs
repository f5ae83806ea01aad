//! The fixed seed population of instruction mutations.

use neuron_qd_core::Module;

/// Name and optional appended mutation text for each canonical seed, in the
/// order the spec lists them. `None` is the unmutated original.
const SEEDS: &[(&str, Option<&str>)] = &[
    ("original", None),
    ("concise", Some("Be concise.")),
    ("chain_of_thought", Some("Think step-by-step.")),
    ("strict_json", Some("Output STRICT JSON.")),
    ("cite_reasons", Some("Cite reasons.")),
    ("simplest", Some("Prefer the simplest answer.")),
];

/// Build the seed population from `base` (already carrying its bootstrapped
/// demos), taking the first `n_inst` canonical seeds (clamped to `[1, 6]`,
/// the size of the fixed set).
///
/// `"original"` is always included and always first, so downstream
/// insertion order gives it first claim on the archive's default bin when
/// every seed ties on score (see [`crate::compile`]'s docs on the
/// zero-successful-evaluations fallback).
pub fn seed_population(base: &Module, n_inst: usize) -> Vec<(&'static str, Module)> {
    let n = n_inst.clamp(1, SEEDS.len());
    SEEDS[..n]
        .iter()
        .map(|(name, mutation)| {
            let module = match mutation {
                None => base.clone(),
                Some(text) => {
                    base.with_evolved_instructions(format!("{}\n{text}", base.instructions))
                }
            };
            (*name, module)
        })
        .collect()
}
