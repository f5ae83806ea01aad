//! Composite scoring and phenotype extraction.
//!
//! `score` turns an expected/actual comparison plus usage metadata into a
//! single real number; `phenotype` turns a scored run into the 4D point
//! the archive places it at. Both are pure and suspension-free.

use neuron_qd_core::{Phenotype, RunMeta};
use rust_decimal::prelude::ToPrimitive;
use serde_json::Value;
use std::collections::BTreeMap;

/// A user-supplied fallback accuracy scorer, invoked when `expected` and
/// `outputs` don't match exactly field-for-field. Returns an accuracy
/// component in `[0, 10]`.
pub type CustomScorer = dyn Fn(&BTreeMap<String, Value>, &BTreeMap<String, Value>) -> f64;

/// Compute the composite score for a run against `expected` outputs.
///
/// `score = max(0.1, accuracy_component - latency_penalty - cost_penalty)`
/// where `accuracy_component` is `10.0` on an exact field-for-field match
/// of every expected output, else the result of `custom_scorer` if one is
/// supplied, else `0.0`. `latency_penalty = min(2.0, elapsed_ms / 5000)`.
/// `cost_penalty = 1000 * cost`.
pub fn score(
    expected: &BTreeMap<String, Value>,
    outputs: &BTreeMap<String, Value>,
    meta: &RunMeta,
    custom_scorer: Option<&CustomScorer>,
) -> f64 {
    let exact_match = expected
        .iter()
        .all(|(k, v)| outputs.get(k).map(|ov| ov == v).unwrap_or(false));

    let accuracy_component = if exact_match {
        10.0
    } else if let Some(scorer) = custom_scorer {
        scorer(expected, outputs)
    } else {
        0.0
    };

    let latency_penalty = (meta.elapsed_ms as f64 / 5000.0).min(2.0);
    let cost_penalty = 1000.0 * meta.cost.to_f64().unwrap_or(0.0);

    (accuracy_component - latency_penalty - cost_penalty).max(0.1)
}

/// Derive the 4D phenotype of a scored run.
///
/// `accuracy` is the already-computed `score` (not `accuracy_component`
/// alone): the phenotype locates the module by its realized, penalized
/// performance, not by a raw correctness count.
pub fn phenotype(meta: &RunMeta, score: f64) -> Phenotype {
    Phenotype::new(
        score,
        meta.elapsed_ms as f64,
        meta.cost.to_f64().unwrap_or(0.0),
        (meta.prompt_tokens + meta.completion_tokens) as f64,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn meta(elapsed_ms: u64, cost: &str, prompt: u64, completion: u64) -> RunMeta {
        RunMeta {
            model: "test-model".to_string(),
            elapsed_ms,
            prompt_tokens: prompt,
            completion_tokens: completion,
            cost: cost.parse::<Decimal>().unwrap(),
        }
    }

    #[test]
    fn exact_match_scores_near_ten() {
        let mut expected = BTreeMap::new();
        expected.insert("summary".to_string(), Value::String("hi".into()));
        let outputs = expected.clone();
        let m = meta(100, "0.0", 10, 10);
        let s = score(&expected, &outputs, &m, None);
        assert!((s - 9.98).abs() < 1e-6);
    }

    #[test]
    fn mismatch_without_custom_scorer_floors_at_point_one() {
        let mut expected = BTreeMap::new();
        expected.insert("summary".to_string(), Value::String("hi".into()));
        let outputs = BTreeMap::new();
        let m = meta(100, "0.0", 10, 10);
        let s = score(&expected, &outputs, &m, None);
        assert_eq!(s, 0.1);
    }

    #[test]
    fn latency_penalty_caps_at_two() {
        let mut expected = BTreeMap::new();
        expected.insert("summary".to_string(), Value::String("hi".into()));
        let outputs = expected.clone();
        let m = meta(50_000, "0.0", 0, 0);
        let s = score(&expected, &outputs, &m, None);
        assert_eq!(s, 8.0);
    }

    #[test]
    fn phenotype_usage_is_prompt_plus_completion() {
        let m = meta(250, "0.01", 100, 50);
        let p = phenotype(&m, 7.5);
        assert_eq!(p.accuracy, 7.5);
        assert_eq!(p.latency, 250.0);
        assert_eq!(p.usage, 150.0);
    }
}
