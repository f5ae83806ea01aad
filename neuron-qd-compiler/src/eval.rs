//! Per-example evaluation: render, send, parse, score for one training pair,
//! fanned out across a training set under a concurrency cap and a shared
//! call budget.

use crate::bootstrap::TrainingExample;
use neuron_qd_core::{Module, Phenotype, Sender};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// A scorer for accuracy when the expected/actual outputs don't match
/// field-for-field exactly. `Send + Sync` so it can cross the `tokio::spawn`
/// boundary used by [`evaluate_module`].
pub type CustomScorer =
    dyn Fn(&std::collections::BTreeMap<String, serde_json::Value>, &std::collections::BTreeMap<String, serde_json::Value>) -> f64
        + Send
        + Sync;

/// Tracks total sender calls spent across a compiler run, checked at
/// generation boundaries (bootstrap, seed, and child evaluation calls all
/// feed the same counter).
pub struct CallBudget {
    used: AtomicU64,
    cap: u64,
}

impl CallBudget {
    /// Construct a budget with the given cap.
    pub fn new(cap: u64) -> Self {
        Self {
            used: AtomicU64::new(0),
            cap,
        }
    }

    /// Whether the cap has been reached or exceeded.
    pub fn exceeded(&self) -> bool {
        self.used.load(Ordering::Relaxed) >= self.cap
    }

    /// Record `n` additional sender calls.
    pub fn record(&self, n: u64) {
        self.used.fetch_add(n, Ordering::Relaxed);
    }

    /// Total calls recorded so far.
    pub fn used(&self) -> u64 {
        self.used.load(Ordering::Relaxed)
    }
}

/// The outcome of evaluating one module against one training example.
#[derive(Debug, Clone, PartialEq)]
pub struct ExampleRun {
    /// Whether the sender call succeeded and the response parsed and
    /// validated against the module's output signature.
    pub ok: bool,
    /// The composite score for this example (never below 0.1).
    pub score: f64,
    /// The phenotype derived from this run.
    pub phenotype: Phenotype,
}

/// Evaluate `module` against every example in `training`, fanning examples
/// out across up to `concurrency` concurrent sender calls.
///
/// A sender failure for a given example is not fatal to the batch: that
/// example's run is recorded as `ok = false, score = 0.1` per the spec's
/// failure semantics, using a zero-cost/zero-latency phenotype since no
/// usage metadata was returned.
pub async fn evaluate_module(
    module: &Module,
    training: &[TrainingExample],
    sender: &Arc<dyn Sender>,
    concurrency: usize,
    custom_scorer: Option<&Arc<CustomScorer>>,
    budget: &CallBudget,
) -> Vec<ExampleRun> {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut handles = Vec::with_capacity(training.len());

    for example in training {
        let module = module.clone();
        let example = example.clone();
        let sender = Arc::clone(sender);
        let semaphore = Arc::clone(&semaphore);
        let custom_scorer = custom_scorer.cloned();

        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire().await.expect("semaphore not closed");
            run_one(&module, &example, sender.as_ref(), custom_scorer.as_deref()).await
        }));
    }

    budget.record(training.len() as u64);

    let mut runs = Vec::with_capacity(handles.len());
    for handle in handles {
        runs.push(handle.await.unwrap_or(ExampleRun {
            ok: false,
            score: 0.1,
            phenotype: Phenotype::new(0.1, 0.0, 0.0, 0.0),
        }));
    }
    runs
}

async fn run_one(
    module: &Module,
    example: &TrainingExample,
    sender: &dyn Sender,
    custom_scorer: Option<&neuron_qd_score::CustomScorer>,
) -> ExampleRun {
    let prompt = neuron_qd_prompt::render(module, &example.inputs);
    let response = match sender.send(&prompt, &module.params).await {
        Ok(r) => r,
        Err(err) => {
            tracing::warn!(module_id = %module.id, error = %err, "compiler: sender failed during evaluation");
            return ExampleRun {
                ok: false,
                score: 0.1,
                phenotype: Phenotype::new(0.1, 0.0, 0.0, 0.0),
            };
        }
    };

    let outcome = neuron_qd_prompt::parse(module, &response.text);
    let score = neuron_qd_score::score(&example.expected, &outcome.outputs, &response.meta, custom_scorer);
    let phenotype = neuron_qd_score::phenotype(&response.meta, score);

    ExampleRun {
        ok: outcome.ok,
        score,
        phenotype,
    }
}

/// Mean score and mean phenotype across a batch of runs. Callers must not
/// pass an empty slice; an empty training set is rejected before any
/// evaluation begins (see [`crate::compile`]).
pub fn aggregate(runs: &[ExampleRun]) -> (f64, Phenotype) {
    let n = runs.len() as f64;
    let mean_score = runs.iter().map(|r| r.score).sum::<f64>() / n;
    let mut acc = [0.0; 4];
    for r in runs {
        let c = r.phenotype.components();
        for i in 0..4 {
            acc[i] += c[i];
        }
    }
    for v in &mut acc {
        *v /= n;
    }
    (mean_score, Phenotype::new(acc[0], acc[1], acc[2], acc[3]))
}

/// The nearest-rank `p`th percentile (0-100) of `scores`. Used to find a
/// parent's underperforming examples during meta-optimize.
pub fn percentile(scores: &[f64], p: f64) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    let mut sorted = scores.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let idx = ((p / 100.0) * (sorted.len() as f64 - 1.0)).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}
