//! Typed signatures: the declared in/out shape of a module.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

/// The closed set of value shapes a signature field can carry.
///
/// Stands in for the dynamic-language source's arbitrary predicate
/// functions: each variant carries its own [`FieldKind::validate`] and a
/// [`FieldKind::type_name`] used by the prompt renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// A JSON string.
    String,
    /// A JSON number (integer or float).
    Number,
    /// A JSON boolean.
    Bool,
    /// A JSON array of strings.
    ListString,
    /// Any JSON value at all — the escape hatch for free-form structure.
    Json,
}

impl FieldKind {
    /// Does `value` satisfy this field kind?
    pub fn validate(&self, value: &Value) -> bool {
        match self {
            FieldKind::String => value.is_string(),
            FieldKind::Number => value.is_number(),
            FieldKind::Bool => value.is_boolean(),
            FieldKind::ListString => {
                value.is_array() && value.as_array().unwrap().iter().all(Value::is_string)
            }
            FieldKind::Json => true,
        }
    }

    /// The semantic type name used when rendering `Input Fields:` /
    /// `Output Fields:` sections of a prompt.
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Number => "number",
            FieldKind::Bool => "boolean",
            FieldKind::ListString => "list",
            FieldKind::Json => "json",
        }
    }
}

/// A single named, typed field in a [`Signature`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigField {
    /// Field name, unique within its side of the signature.
    pub name: String,
    /// The value shape this field accepts.
    pub kind: FieldKind,
}

impl SigField {
    /// Construct a field.
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// A typed declaration of a module's inputs and outputs.
///
/// Immutable once constructed: field order is significant for both
/// rendering and parsing, so a `Signature` never exposes mutation, only
/// [`Signature::new`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// Human-readable signature name, e.g. `"summarize"`.
    pub name: String,
    /// Ordered input fields.
    pub inputs: Vec<SigField>,
    /// Ordered output fields.
    pub outputs: Vec<SigField>,
}

impl Signature {
    /// Construct a signature, rejecting duplicate field names within either side.
    pub fn new(
        name: impl Into<String>,
        inputs: Vec<SigField>,
        outputs: Vec<SigField>,
    ) -> Result<Self, CoreError> {
        check_unique(&inputs, "input")?;
        check_unique(&outputs, "output")?;
        Ok(Self {
            name: name.into(),
            inputs,
            outputs,
        })
    }
}

fn check_unique(fields: &[SigField], side: &'static str) -> Result<(), CoreError> {
    let mut seen = HashSet::new();
    for f in fields {
        if !seen.insert(f.name.as_str()) {
            return Err(CoreError::DuplicateField {
                side,
                name: f.name.clone(),
            });
        }
    }
    Ok(())
}
