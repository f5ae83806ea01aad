//! The first-to-k voting protocol: spawn parallel samplers, screen each
//! response through the red-flag filters, and commit to the first
//! canonical answer to accumulate enough weighted votes.

use crate::config::VotingConfig;
use crate::red_flag::{classify, vote_weight, RedFlagConfig};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// How many times a single voter slot will resample after a critical
/// red-flag before giving up silently. Not specified numerically by the
/// spec ("until budget/timeout"); bounding it here keeps a voter that keeps
/// producing incoherent output from looping until the whole round's
/// timeout instead of just sitting out.
const MAX_RESAMPLE_ATTEMPTS: usize = 4;

/// One independent sampling source for a voting round. A voter is asked
/// for `attempt`-th resample of its slot after a prior attempt was
/// discarded by a critical red flag.
#[async_trait]
pub trait Sampler: Send + Sync {
    /// Produce raw response text for `voter_index`'s `attempt`-th try.
    async fn sample(&self, voter_index: usize, attempt: usize) -> Result<String, String>;
}

struct VoterMessage {
    voter_index: usize,
    canonical: String,
    raw: Value,
    weight: f64,
}

/// Outcome of a [`first_to_k`] round.
pub struct FirstToKOutcome {
    /// The winning candidate and its final weighted vote total, if any
    /// candidate was ever counted.
    pub winner: Option<(Value, f64)>,
    /// Every distinct canonical candidate seen, with its weighted total.
    pub tally: Vec<(Value, f64)>,
    /// Voter indices whose task was aborted before contributing a vote.
    pub cancelled_voters: Vec<usize>,
    /// Whether the round ended by timeout rather than by reaching `k_threshold`.
    pub timed_out: bool,
}

/// Run a first-to-k voting round.
///
/// Spawns `config.n_voters` independent tasks, each calling `sampler` and
/// resampling (up to [`MAX_RESAMPLE_ATTEMPTS`] times) whenever a critical
/// red flag discards its sample. As soon as one canonical answer
/// accumulates `>= config.k_threshold` weighted votes, it wins and the
/// remaining voter tasks are aborted. If `config.timeout_ms` elapses
/// first, the candidate with the highest weighted total wins, ties broken
/// by whichever was first recorded.
pub async fn first_to_k(
    config: &VotingConfig,
    red_flag_config: &RedFlagConfig,
    required_fields: &[String],
    sampler: Arc<dyn Sampler>,
) -> FirstToKOutcome {
    let (tx, mut rx) = mpsc::unbounded_channel::<VoterMessage>();
    let mut handles: Vec<JoinHandle<()>> = Vec::with_capacity(config.n_voters);

    for voter_index in 0..config.n_voters {
        let sampler = sampler.clone();
        let tx = tx.clone();
        let red_flag_config = red_flag_config.clone();
        let required_fields = required_fields.to_vec();
        handles.push(tokio::spawn(async move {
            for attempt in 0..MAX_RESAMPLE_ATTEMPTS {
                let Ok(text) = sampler.sample(voter_index, attempt).await else {
                    continue;
                };
                let flags = classify(&text, &required_fields, &red_flag_config);
                let weight = vote_weight(&flags);
                if weight <= 0.0 {
                    tracing::debug!(voter_index, attempt, ?flags, "voting: sample discarded, resampling");
                    continue;
                }
                let canonical = canonicalize(&text);
                let raw = serde_json::from_str(&canonical).unwrap_or_else(|_| Value::String(text.clone()));
                let _ = tx.send(VoterMessage {
                    voter_index,
                    canonical,
                    raw,
                    weight,
                });
                return;
            }
            tracing::warn!(voter_index, "voting: exhausted resample budget without a clean sample");
        }));
    }
    drop(tx);

    let mut tally: HashMap<String, (f64, Value, usize)> = HashMap::new();
    let mut seen_voters: HashSet<usize> = HashSet::new();
    let mut order = 0usize;
    let mut winner: Option<(Value, f64)> = None;
    let mut timed_out = false;

    let deadline = tokio::time::sleep(Duration::from_millis(config.timeout_ms));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            biased;
            _ = &mut deadline => {
                timed_out = true;
                break;
            }
            msg = rx.recv() => {
                match msg {
                    None => break,
                    Some(m) => {
                        seen_voters.insert(m.voter_index);
                        let entry = tally
                            .entry(m.canonical.clone())
                            .or_insert((0.0, m.raw.clone(), order));
                        entry.0 += m.weight;
                        order += 1;
                        if entry.0 >= config.k_threshold as f64 {
                            tracing::info!(votes = entry.0, "voting: first-to-k reached");
                            winner = Some((entry.1.clone(), entry.0));
                            break;
                        }
                    }
                }
            }
        }
    }

    if winner.is_none() {
        winner = tally
            .values()
            .cloned()
            .max_by(|a, b| a.0.partial_cmp(&b.0).unwrap().then(b.2.cmp(&a.2)))
            .map(|(w, v, _)| (v, w));
    }

    for h in &handles {
        h.abort();
    }
    let cancelled_voters: Vec<usize> = (0..config.n_voters)
        .filter(|i| !seen_voters.contains(i))
        .collect();

    let tally_vec: Vec<(Value, f64)> = tally.values().map(|(w, v, _)| (v.clone(), *w)).collect();

    FirstToKOutcome {
        winner,
        tally: tally_vec,
        cancelled_voters,
        timed_out,
    }
}

/// Canonicalize a response to compare candidates for equality: extract the
/// first balanced JSON object and re-serialize it. `serde_json::Value`'s
/// default map type is a `BTreeMap`, so round-tripping through it already
/// produces a stable, sorted-key string — no separate field-reordering
/// step is needed.
fn canonicalize(text: &str) -> String {
    if let Some(start) = text.find('{') {
        if let Some(end) = text.rfind('}') {
            if end >= start {
                if let Ok(v) = serde_json::from_str::<Value>(&text[start..=end]) {
                    return v.to_string();
                }
            }
        }
    }
    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedSampler {
        responses: Vec<(u64, &'static str)>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Sampler for ScriptedSampler {
        async fn sample(&self, voter_index: usize, _attempt: usize) -> Result<String, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let (delay_ms, text) = self.responses[voter_index];
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            Ok(text.to_string())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn s4_first_to_k_consensus() {
        // Arrival order by delay: voter0(A)@10ms, voter1(B)@20ms, voter2(A)@30ms,
        // voter3(A)@40ms, voter4(B)@50ms. A reaches k=3 on voter3's message
        // (the 3rd A), at which point only voter4 hasn't reported yet.
        let sampler = Arc::new(ScriptedSampler {
            responses: vec![
                (10, r#"{"answer": "A"}"#),
                (20, r#"{"answer": "B"}"#),
                (30, r#"{"answer": "A"}"#),
                (40, r#"{"answer": "A"}"#),
                (50, r#"{"answer": "B"}"#),
            ],
            calls: AtomicUsize::new(0),
        });
        let config = VotingConfig {
            n_voters: 5,
            k_threshold: 3,
            timeout_ms: 100_000,
            decorrelate: true,
        };
        let outcome = first_to_k(&config, &RedFlagConfig::default(), &[], sampler).await;
        assert!(!outcome.timed_out);
        let (winner, votes) = outcome.winner.unwrap();
        assert_eq!(winner, serde_json::json!({"answer": "A"}));
        assert_eq!(votes, 3.0);
        assert_eq!(outcome.cancelled_voters, vec![4]);
    }

    struct AlwaysEmptyThenOnce {
        empty_calls: AtomicUsize,
    }

    #[async_trait]
    impl Sampler for AlwaysEmptyThenOnce {
        async fn sample(&self, voter_index: usize, _attempt: usize) -> Result<String, String> {
            if voter_index == 0 {
                self.empty_calls.fetch_add(1, Ordering::SeqCst);
                Ok("   ".to_string())
            } else {
                Ok(r#"{"answer": "only"}"#.to_string())
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn s5_red_flagged_sample_excluded_then_timeout() {
        let sampler = Arc::new(AlwaysEmptyThenOnce {
            empty_calls: AtomicUsize::new(0),
        });
        let config = VotingConfig {
            n_voters: 2,
            k_threshold: 2,
            timeout_ms: 1_000,
            decorrelate: false,
        };
        let outcome = first_to_k(&config, &RedFlagConfig::default(), &[], sampler.clone()).await;
        assert!(outcome.timed_out);
        let (winner, votes) = outcome.winner.unwrap();
        assert_eq!(winner, serde_json::json!({"answer": "only"}));
        assert_eq!(votes, 1.0);
        // voter 0 kept resampling empty responses and never contributed
        assert!(sampler.empty_calls.load(Ordering::SeqCst) >= MAX_RESAMPLE_ATTEMPTS);
    }
}
