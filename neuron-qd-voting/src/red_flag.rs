//! Reliability screens applied to a single sampled response before it's
//! counted in voting.

use std::collections::HashSet;

/// Configurable thresholds for red-flag classification.
#[derive(Debug, Clone)]
pub struct RedFlagConfig {
    /// Responses with more than this many whitespace-separated words are
    /// flagged as a length explosion. A rough proxy for a token ceiling.
    pub token_ceiling: usize,
    /// Case-insensitive hedge phrases that count toward low-confidence.
    pub hedge_markers: Vec<String>,
    /// More than this many hedge-marker occurrences trips low-confidence.
    pub hedge_ceiling: usize,
    /// Trigram repetition ratio above this trips the repetition flag.
    pub repetition_threshold: f64,
}

impl Default for RedFlagConfig {
    fn default() -> Self {
        Self {
            token_ceiling: 2000,
            hedge_markers: vec![
                "not sure".to_string(),
                "might be".to_string(),
                "cannot confirm".to_string(),
            ],
            hedge_ceiling: 2,
            repetition_threshold: 0.4,
        }
    }
}

/// A single reliability flag raised against a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedFlagKind {
    /// Response is implausibly long.
    LengthExplosion,
    /// Response failed to parse as JSON, or is missing a required field.
    FormatViolation,
    /// Response hedges more than the configured ceiling.
    LowConfidence,
    /// Response is dominated by repeated trigrams.
    Repetition,
    /// Response is empty or whitespace-only.
    Incoherence,
}

/// Severity of a [`RedFlagKind`]: critical flags discard the sample,
/// warning flags merely halve its vote weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Discard the sample and trigger a resample.
    Critical,
    /// Keep the sample but count it at half weight.
    Warning,
}

impl RedFlagKind {
    /// This flag's severity.
    pub fn severity(&self) -> Severity {
        match self {
            RedFlagKind::LengthExplosion => Severity::Critical,
            RedFlagKind::FormatViolation => Severity::Critical,
            RedFlagKind::Incoherence => Severity::Critical,
            RedFlagKind::LowConfidence => Severity::Warning,
            RedFlagKind::Repetition => Severity::Warning,
        }
    }
}

/// Classify `text` against every red-flag filter.
///
/// `required_fields`, when non-empty, makes `format-violation` also fire
/// when the text parses as JSON but a required field is absent; with no
/// required fields, `format-violation` fires only on an outright parse
/// failure.
pub fn classify(text: &str, required_fields: &[String], config: &RedFlagConfig) -> Vec<RedFlagKind> {
    let mut flags = Vec::new();

    if text.trim().is_empty() {
        flags.push(RedFlagKind::Incoherence);
        // An empty response can't usefully be checked for anything else.
        return flags;
    }

    let word_count = text.split_whitespace().count();
    if word_count > config.token_ceiling {
        flags.push(RedFlagKind::LengthExplosion);
    }

    if format_violates(text, required_fields) {
        flags.push(RedFlagKind::FormatViolation);
    }

    let lower = text.to_lowercase();
    let hedge_count: usize = config
        .hedge_markers
        .iter()
        .map(|marker| lower.matches(marker.as_str()).count())
        .sum();
    if hedge_count > config.hedge_ceiling {
        flags.push(RedFlagKind::LowConfidence);
    }

    if trigram_repetition_ratio(text) > config.repetition_threshold {
        flags.push(RedFlagKind::Repetition);
    }

    flags
}

fn format_violates(text: &str, required_fields: &[String]) -> bool {
    let Some(start) = text.find('{') else {
        return true;
    };
    let Some(end) = text.rfind('}') else {
        return true;
    };
    if end < start {
        return true;
    }
    let Ok(value) = serde_json::from_str::<serde_json::Value>(&text[start..=end]) else {
        return true;
    };
    let Some(obj) = value.as_object() else {
        return true;
    };
    required_fields.iter().any(|f| !obj.contains_key(f))
}

fn trigram_repetition_ratio(text: &str) -> f64 {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() < 3 {
        return 0.0;
    }
    let trigrams: Vec<String> = words.windows(3).map(|w| w.join(" ")).collect();
    let total = trigrams.len();
    let unique: HashSet<&String> = trigrams.iter().collect();
    1.0 - (unique.len() as f64 / total as f64)
}

/// The vote weight of a sample given its flags: `0.0` (discard) if any
/// flag is critical, `0.5` if only warnings, `1.0` if clean.
pub fn vote_weight(flags: &[RedFlagKind]) -> f64 {
    if flags.iter().any(|f| f.severity() == Severity::Critical) {
        0.0
    } else if flags.is_empty() {
        1.0
    } else {
        0.5
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_response_is_incoherent() {
        let flags = classify("   ", &[], &RedFlagConfig::default());
        assert_eq!(flags, vec![RedFlagKind::Incoherence]);
        assert_eq!(vote_weight(&flags), 0.0);
    }

    #[test]
    fn clean_json_has_no_flags() {
        let flags = classify(r#"{"answer": "42"}"#, &["answer".to_string()], &RedFlagConfig::default());
        assert!(flags.is_empty());
        assert_eq!(vote_weight(&flags), 1.0);
    }

    #[test]
    fn missing_required_field_is_format_violation() {
        let flags = classify(r#"{"other": 1}"#, &["answer".to_string()], &RedFlagConfig::default());
        assert!(flags.contains(&RedFlagKind::FormatViolation));
        assert_eq!(vote_weight(&flags), 0.0);
    }

    #[test]
    fn hedge_markers_trigger_low_confidence_at_half_weight() {
        let text = r#"{"answer": "I am not sure, it might be 42, cannot confirm though."}"#;
        let flags = classify(text, &[], &RedFlagConfig::default());
        assert!(flags.contains(&RedFlagKind::LowConfidence));
        assert_eq!(vote_weight(&flags), 0.5);
    }

    #[test]
    fn repeated_trigrams_flagged() {
        let text = r#"{"answer": "go go go go go go go go go"}"#;
        let flags = classify(text, &[], &RedFlagConfig::default());
        assert!(flags.contains(&RedFlagKind::Repetition));
    }
}
