//! Extracts and validates structured output from a model response.

use neuron_qd_core::{Module, Strategy};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// Why parsing a response failed, in the spec's documented priority order:
/// a missing JSON object is checked before any field-level validation, and
/// fields are validated in signature order so the first missing/mismatched
/// field wins.
#[non_exhaustive]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// No balanced JSON object substring was found in the response.
    #[error("parse-no-json")]
    NoJson,

    /// A declared output field was absent from the parsed object.
    #[error("parse-missing-field:{0}")]
    MissingField(String),

    /// A declared output field was present but failed its predicate.
    #[error("parse-type-mismatch:{0}")]
    TypeMismatch(String),
}

/// The result of parsing a response against a module's output signature.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseOutcome {
    /// Whether every declared output field was present and valid.
    pub ok: bool,
    /// Parsed output fields. Empty when `ok` is false.
    pub outputs: BTreeMap<String, Value>,
    /// The original, unmodified response text.
    pub raw: String,
    /// The failure reason, if `ok` is false.
    pub error: Option<ParseError>,
}

/// Parse `raw` against `module`'s declared output fields.
///
/// For a [`Strategy::ChainOfThought`] module, `thought` is accepted as an
/// additional string field but is not itself a declared output: its absence
/// or type never fails the parse, and it is not included in `outputs`.
pub fn parse(module: &Module, raw: &str) -> ParseOutcome {
    let Some(json_str) = extract_json_object(raw) else {
        tracing::debug!(module_id = %module.id, "parse-no-json");
        return ParseOutcome {
            ok: false,
            outputs: BTreeMap::new(),
            raw: raw.to_string(),
            error: Some(ParseError::NoJson),
        };
    };

    let parsed: Value = match serde_json::from_str(&json_str) {
        Ok(v) => v,
        Err(_) => {
            tracing::debug!(module_id = %module.id, "parse-no-json (invalid json body)");
            return ParseOutcome {
                ok: false,
                outputs: BTreeMap::new(),
                raw: raw.to_string(),
                error: Some(ParseError::NoJson),
            };
        }
    };

    let Value::Object(obj) = parsed else {
        return ParseOutcome {
            ok: false,
            outputs: BTreeMap::new(),
            raw: raw.to_string(),
            error: Some(ParseError::NoJson),
        };
    };

    if module.strategy == Strategy::ChainOfThought {
        if let Some(thought) = obj.get("thought") {
            if !thought.is_string() {
                tracing::debug!(module_id = %module.id, "thought field present but not a string, ignoring");
            }
        }
    }

    let mut outputs = BTreeMap::new();
    for field in &module.signature.outputs {
        let Some(value) = obj.get(&field.name) else {
            tracing::warn!(module_id = %module.id, field = %field.name, "parse-missing-field");
            return ParseOutcome {
                ok: false,
                outputs: BTreeMap::new(),
                raw: raw.to_string(),
                error: Some(ParseError::MissingField(field.name.clone())),
            };
        };
        if !field.kind.validate(value) {
            tracing::warn!(module_id = %module.id, field = %field.name, "parse-type-mismatch");
            return ParseOutcome {
                ok: false,
                outputs: BTreeMap::new(),
                raw: raw.to_string(),
                error: Some(ParseError::TypeMismatch(field.name.clone())),
            };
        }
        outputs.insert(field.name.clone(), value.clone());
    }

    ParseOutcome {
        ok: true,
        outputs,
        raw: raw.to_string(),
        error: None,
    }
}

/// Find the first balanced `{ ... }` substring in `text`, respecting quoted
/// strings and backslash escapes so braces inside string values don't throw
/// off the depth count.
fn extract_json_object(text: &str) -> Option<String> {
    let bytes = text.as_bytes();
    let start = text.find('{')?;

    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    let mut i = start;
    while i < bytes.len() {
        let c = bytes[i] as char;
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
        } else {
            match c {
                '"' => in_string = true,
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(text[start..=i].to_string());
                    }
                }
                _ => {}
            }
        }
        i += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use neuron_qd_core::{FieldKind, Signature, SigField};

    fn sig() -> Signature {
        Signature::new(
            "summarize",
            vec![SigField::new("text", FieldKind::String)],
            vec![SigField::new("summary", FieldKind::String)],
        )
        .unwrap()
    }

    #[test]
    fn parses_clean_json() {
        let m = Module::predict(sig(), "i");
        let out = parse(&m, r#"{"summary": "hi"}"#);
        assert!(out.ok);
        assert_eq!(out.outputs["summary"], Value::String("hi".into()));
    }

    #[test]
    fn extracts_json_embedded_in_prose() {
        let m = Module::predict(sig(), "i");
        let out = parse(&m, r#"Sure, here you go: {"summary": "hi"} Hope that helps!"#);
        assert!(out.ok);
    }

    #[test]
    fn handles_braces_inside_string_values() {
        let m = Module::predict(sig(), "i");
        let out = parse(&m, r#"{"summary": "a {nested} brace"}"#);
        assert!(out.ok);
        assert_eq!(out.outputs["summary"], Value::String("a {nested} brace".into()));
    }

    #[test]
    fn no_json_found() {
        let m = Module::predict(sig(), "i");
        let out = parse(&m, "just some free text");
        assert_eq!(out.error, Some(ParseError::NoJson));
    }

    #[test]
    fn missing_field_reported() {
        let m = Module::predict(sig(), "i");
        let out = parse(&m, r#"{"other": 1}"#);
        assert_eq!(out.error, Some(ParseError::MissingField("summary".into())));
    }

    #[test]
    fn type_mismatch_reported() {
        let m = Module::predict(sig(), "i");
        let out = parse(&m, r#"{"summary": 5}"#);
        assert_eq!(out.error, Some(ParseError::TypeMismatch("summary".into())));
    }

    #[test]
    fn chain_of_thought_thought_field_not_required_in_outputs() {
        use neuron_qd_core::Module;
        let m = Module::chain_of_thought(sig(), "i");
        let out = parse(&m, r#"{"thought": "because", "summary": "hi"}"#);
        assert!(out.ok);
        assert!(!out.outputs.contains_key("thought"));
    }
}
