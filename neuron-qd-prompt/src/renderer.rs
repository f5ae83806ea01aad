//! Serializes a module's instructions, signature, demos and concrete inputs
//! into a single prompt string.

use neuron_qd_core::{Module, SigField, Strategy};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Render a prompt for `module` given concrete `inputs`.
///
/// Inputs are keyed by field name; fields the signature declares but which
/// are absent from `inputs` are rendered with an empty value rather than
/// omitted, since the Output Fields / Input Fields sections must always
/// reflect the full declared signature.
pub fn render(module: &Module, inputs: &BTreeMap<String, Value>) -> String {
    let mut out = String::new();

    writeln!(out, "{}", module.instructions).ok();
    out.push('\n');

    writeln!(out, "Input Fields:").ok();
    for f in &module.signature.inputs {
        writeln!(out, "- {}: {}", f.name, f.kind.type_name()).ok();
    }
    out.push('\n');

    writeln!(out, "Output Fields:").ok();
    if module.strategy == Strategy::ChainOfThought {
        writeln!(out, "- thought: string").ok();
    }
    for f in &module.signature.outputs {
        writeln!(out, "- {}: {}", f.name, f.kind.type_name()).ok();
    }
    out.push('\n');

    for (i, demo) in module.demos.iter().enumerate() {
        writeln!(out, "Example {}:", i + 1).ok();
        render_demo_side(&mut out, &module.signature.inputs, demo);
        render_demo_side(&mut out, &module.signature.outputs, demo);
        out.push('\n');
    }

    writeln!(
        out,
        "Now respond with STRICT JSON containing exactly the output fields."
    )
    .ok();
    for f in &module.signature.inputs {
        let value = inputs.get(&f.name);
        writeln!(out, "{}: {}", f.name, render_value(value)).ok();
    }

    out
}

fn render_demo_side(out: &mut String, fields: &[SigField], demo: &BTreeMap<String, Value>) {
    for f in fields {
        if let Some(v) = demo.get(&f.name) {
            writeln!(out, "{}: {}", f.name, render_value(Some(v))).ok();
        }
    }
}

fn render_value(v: Option<&Value>) -> String {
    match v {
        None => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
