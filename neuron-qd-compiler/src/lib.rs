//! The MAP-Elites compiler: bootstraps few-shot demos onto a base module,
//! seeds a fixed population of instruction mutations, evaluates each against
//! a training set, and then evolves further children by asking the sender
//! to rewrite instructions in light of the parent's failing examples.
//!
//! Per-generation and per-example failures never abort a run (see the
//! spec's failure semantics) — only an empty training set is a hard error.

pub mod bootstrap;
pub mod error;
pub mod eval;
pub mod knobs;
mod seed;

pub use bootstrap::{bootstrap_demos, TrainingExample};
pub use error::CompilerError;
pub use eval::{aggregate, evaluate_module, percentile, CallBudget, CustomScorer, ExampleRun};
pub use knobs::CompilerKnobs;
pub use seed::seed_population;

use neuron_qd_archive::Archive;
use neuron_qd_core::{Module, Phenotype, Sender};
use rand::seq::SliceRandom;
use std::sync::Arc;

/// What one [`compile`] run produced.
pub struct CompileOutcome {
    /// The resulting archive of module variants.
    pub archive: Archive,
    /// How many evolutionary generations actually ran (may be less than
    /// `knobs.iters` if the call budget was exhausted early).
    pub generations_run: usize,
    /// Total sender calls spent across bootstrap, seed evaluation,
    /// meta-optimize, and child evaluation.
    pub calls_used: u64,
}

/// Evolve `base` against `training` via MAP-Elites, returning the resulting
/// archive.
///
/// `base` should not yet carry demos; [`bootstrap_demos`] attaches them here
/// from `training` itself. The seed population (§4.F step 2) is evaluated
/// first; archive binning recalibrates its thresholds from the cloud on
/// every insert (see `neuron_qd_archive::Archive::insert`), so the "median
/// latency/cost/usage across all seed runs" calibration the spec describes
/// falls out of that existing behavior rather than needing a separate pass
/// here.
pub async fn compile(
    base: Module,
    training: Vec<TrainingExample>,
    sender: Arc<dyn Sender>,
    knobs: CompilerKnobs,
    custom_scorer: Option<Arc<CustomScorer>>,
) -> Result<CompileOutcome, CompilerError> {
    if training.is_empty() {
        return Err(CompilerError::EmptyTrainingSet);
    }

    let budget = CallBudget::new(knobs.call_budget);
    let demos = bootstrap_demos(&training, &base.signature, knobs.k_demos);
    let seeded_base = base.with_demos(demos);

    // Local bookkeeping of every module variant we've actually evaluated,
    // paired with its per-example runs (meta-optimize needs a parent's own
    // runs to find its failing examples) and its aggregate score (to weight
    // nothing — selection below is uniform, per the spec). The archive
    // itself only remembers bin occupants and the point cloud, not this
    // provenance, so it's tracked alongside rather than recovered from it.
    let mut population: Vec<(Module, Vec<ExampleRun>, f64)> = Vec::new();
    let mut archive = Archive::new(seeded_base.signature.name.clone());

    for (name, seed_module) in seed_population(&seeded_base, knobs.n_inst) {
        if budget.exceeded() {
            tracing::info!(seed = name, "compiler: call budget exhausted before seeding finished");
            break;
        }
        let runs = evaluate_module(
            &seed_module,
            &training,
            &sender,
            knobs.concurrency,
            custom_scorer.as_ref(),
            &budget,
        )
        .await;
        let (score, phenotype) = aggregate(&runs);
        archive.insert(seed_module.clone(), score, phenotype);
        population.push((seed_module, runs, score));
    }

    let any_seed_succeeded = population
        .iter()
        .any(|(_, runs, _)| runs.iter().any(|r| r.ok));
    if !any_seed_succeeded {
        tracing::warn!("compiler: zero successful evaluations across every seed, returning bootstrap module alone");
        let mut fallback_archive = Archive::new(seeded_base.signature.name.clone());
        fallback_archive.insert(
            seeded_base,
            0.1,
            Phenotype::new(0.1, 0.0, 0.0, 0.0),
        );
        return Ok(CompileOutcome {
            archive: fallback_archive,
            generations_run: 0,
            calls_used: budget.used(),
        });
    }

    let mut rng = rand::thread_rng();
    let mut generations_run = 0usize;

    for _generation in 0..knobs.iters {
        if budget.exceeded() {
            tracing::info!(generations_run, "compiler: call budget exhausted, stopping evolution");
            break;
        }
        generations_run += 1;

        let Some((parent, parent_runs, _parent_score)) = population.choose(&mut rng) else {
            break;
        };

        let Some(child) = meta_optimize(parent, parent_runs, &training, sender.as_ref(), &budget).await else {
            tracing::warn!(generation = generations_run, "compiler: meta-optimize failed, skipping generation");
            continue;
        };

        let runs = evaluate_module(
            &child,
            &training,
            &sender,
            knobs.concurrency,
            custom_scorer.as_ref(),
            &budget,
        )
        .await;
        let (score, phenotype) = aggregate(&runs);
        archive.insert(child.clone(), score, phenotype);
        population.push((child, runs, score));
    }

    Ok(CompileOutcome {
        archive,
        generations_run,
        calls_used: budget.used(),
    })
}

/// Ask the sender to rewrite `parent`'s instructions in light of its
/// worst-performing training examples. Returns `None` on any sender or
/// parse failure — a meta-optimize failure skips the generation, it is not
/// fatal to the run.
async fn meta_optimize(
    parent: &Module,
    parent_runs: &[ExampleRun],
    training: &[TrainingExample],
    sender: &dyn Sender,
    budget: &CallBudget,
) -> Option<Module> {
    let scores: Vec<f64> = parent_runs.iter().map(|r| r.score).collect();
    let cutoff = percentile(&scores, 25.0);
    let failing: Vec<&TrainingExample> = training
        .iter()
        .zip(parent_runs.iter())
        .filter(|(_, run)| !run.ok || run.score < cutoff)
        .map(|(example, _)| example)
        .collect();

    let prompt = format!(
        "Current instructions:\n{}\n\n\
         These training examples are failing or scoring in the bottom quartile:\n{}\n\n\
         Propose improved instructions that would fix them. Respond with STRICT JSON: \
         {{\"thought\": <string>, \"new_inst\": <string>}}.",
        parent.instructions,
        summarize_failures(&failing),
    );

    budget.record(1);
    let response = match sender.send(&prompt, &parent.params).await {
        Ok(r) => r,
        Err(err) => {
            tracing::warn!(error = %err, "compiler: meta-optimize sender call failed");
            return None;
        }
    };

    extract_new_instructions(&response.text).map(|new_inst| parent.with_evolved_instructions(new_inst))
}

fn summarize_failures(failing: &[&TrainingExample]) -> String {
    if failing.is_empty() {
        return "(none — evolving from a clean baseline)".to_string();
    }
    failing
        .iter()
        .take(5)
        .enumerate()
        .map(|(i, example)| {
            format!(
                "{}. inputs={:?} expected={:?}",
                i + 1,
                example.inputs,
                example.expected
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn extract_new_instructions(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    let value: serde_json::Value = serde_json::from_str(&text[start..=end]).ok()?;
    value.get("new_inst")?.as_str().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use neuron_qd_core::{FieldKind, RunMeta, SenderError, SenderResponse, SigField, Signature};
    use rust_decimal::Decimal;
    use serde_json::Value;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sig() -> Signature {
        Signature::new(
            "answer",
            vec![SigField::new("question", FieldKind::String)],
            vec![SigField::new("answer", FieldKind::String)],
        )
        .unwrap()
    }

    fn training_set() -> Vec<TrainingExample> {
        vec![
            TrainingExample::new(
                BTreeMap::from([("question".to_string(), Value::String("2+2".into()))]),
                BTreeMap::from([("answer".to_string(), Value::String("4".into()))]),
            ),
            TrainingExample::new(
                BTreeMap::from([("question".to_string(), Value::String("3+3".into()))]),
                BTreeMap::from([("answer".to_string(), Value::String("6".into()))]),
            ),
        ]
    }

    /// A sender that always answers correctly for the seed/child evaluation
    /// calls (a `{"answer": ...}` echo), and responds with a fixed
    /// meta-optimize payload for the interpret-priority-shaped prompts.
    struct EchoCorrectSender {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Sender for EchoCorrectSender {
        async fn send(
            &self,
            prompt: &str,
            _params: &BTreeMap<String, Value>,
        ) -> Result<SenderResponse, SenderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let meta = RunMeta {
                model: "test".into(),
                elapsed_ms: 50,
                prompt_tokens: 10,
                completion_tokens: 5,
                cost: Decimal::ZERO,
            };
            if prompt.contains("new_inst") {
                return Ok(SenderResponse {
                    text: r#"{"thought": "tighten it up", "new_inst": "Answer the arithmetic question with just the number."}"#.to_string(),
                    meta,
                });
            }
            // Training-example evaluation calls: echo back whichever answer
            // the rendered prompt's trailing inputs implies, by grabbing the
            // last digit sequence mentioned in expected-looking text isn't
            // available here, so just always answer correctly for "2+2"/"3+3".
            let text = if prompt.contains("question: 2+2") {
                r#"{"answer": "4"}"#
            } else {
                r#"{"answer": "6"}"#
            };
            Ok(SenderResponse {
                text: text.to_string(),
                meta,
            })
        }
    }

    #[tokio::test]
    async fn compile_runs_end_to_end_and_keeps_best_module() {
        let base = Module::predict(sig(), "Answer the question.");
        let sender = Arc::new(EchoCorrectSender {
            calls: AtomicUsize::new(0),
        });
        let knobs = CompilerKnobs {
            k_demos: 1,
            n_inst: 3,
            iters: 2,
            call_budget: 1000,
            concurrency: 4,
        };

        let outcome = compile(base, training_set(), sender, knobs, None)
            .await
            .unwrap();

        assert!(!outcome.archive.is_empty());
        assert!(outcome.calls_used > 0);
        // Every evaluation was an exact match, so the champion should score near 10.
        let champion_key = outcome.archive.default_bin_key().unwrap();
        let (score, _module) = outcome.archive.bin(&champion_key).unwrap();
        assert!(score > 9.0, "expected a near-perfect champion score, got {score}");
    }

    #[tokio::test]
    async fn empty_training_set_is_rejected() {
        let base = Module::predict(sig(), "x");
        let sender = Arc::new(EchoCorrectSender {
            calls: AtomicUsize::new(0),
        });
        let err = compile(base, vec![], sender, CompilerKnobs::default(), None)
            .await
            .unwrap_err();
        assert_eq!(err, CompilerError::EmptyTrainingSet);
    }

    struct AlwaysWrongSender;

    #[async_trait]
    impl Sender for AlwaysWrongSender {
        async fn send(
            &self,
            _prompt: &str,
            _params: &BTreeMap<String, Value>,
        ) -> Result<SenderResponse, SenderError> {
            Ok(SenderResponse {
                text: "no json here at all".to_string(),
                meta: RunMeta {
                    model: "test".into(),
                    elapsed_ms: 10,
                    prompt_tokens: 1,
                    completion_tokens: 1,
                    cost: Decimal::ZERO,
                },
            })
        }
    }

    #[tokio::test]
    async fn zero_successful_evaluations_returns_bootstrap_alone() {
        let base = Module::predict(sig(), "Answer the question.");
        let sender = Arc::new(AlwaysWrongSender);
        let knobs = CompilerKnobs {
            k_demos: 1,
            n_inst: 2,
            iters: 5,
            call_budget: 1000,
            concurrency: 2,
        };

        let outcome = compile(base, training_set(), sender, knobs, None)
            .await
            .unwrap();

        assert_eq!(outcome.generations_run, 0);
        assert_eq!(outcome.archive.len(), 1);
        let key = outcome.archive.default_bin_key().unwrap();
        let (score, _) = outcome.archive.bin(&key).unwrap();
        assert_eq!(score, 0.1);
    }

    #[test]
    fn extract_new_instructions_from_clean_json() {
        let text = r#"{"thought": "t", "new_inst": "be better"}"#;
        assert_eq!(extract_new_instructions(text), Some("be better".to_string()));
    }

    #[test]
    fn extract_new_instructions_rejects_non_json() {
        assert_eq!(extract_new_instructions("not json"), None);
    }
}
