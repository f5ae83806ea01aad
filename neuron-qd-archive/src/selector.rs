//! Priority-driven module selection: keyword targets, geometric nearest
//! neighbor, and natural-language priority interpretation via the sender.

use neuron_qd_core::{Phenotype, Sender};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;

/// A module-archive priority: a fixed keyword, the always-best-scoring
/// module, or a free-form description interpreted by the sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModulePriority {
    /// Fastest module (lowest latency).
    Fast,
    /// Cheapest module (lowest cost).
    Cheap,
    /// Most accurate module.
    Accurate,
    /// Most compact module (lowest token usage). Alias of `Concise`.
    Concise,
    /// Most verbose module (highest token usage).
    Verbose,
    /// The single highest-scoring module in the archive, regardless of shape.
    Best,
    /// A free-form natural-language description, interpreted via the sender.
    Custom(String),
}

/// Look up the normalized target phenotype for a fixed keyword.
///
/// `Concise` is the `concise`/`compact` row and `Accurate` is the
/// `accurate`/`best` row of the keyword map (§6); `Best` itself bypasses
/// this table entirely (`Archive::select` special-cases it before
/// consulting the keyword map — see the module-level docs for why the two
/// overlapping rows don't actually collide in practice).
pub fn keyword_target(keyword: &ModulePriority) -> Option<Phenotype> {
    match keyword {
        ModulePriority::Fast => Some(Phenotype::new(5.0, 0.0, 0.5, 0.5)),
        ModulePriority::Cheap => Some(Phenotype::new(5.0, 0.5, 0.0, 0.5)),
        ModulePriority::Accurate => Some(Phenotype::new(10.0, 0.5, 0.5, 0.5)),
        ModulePriority::Concise => Some(Phenotype::new(5.0, 0.5, 0.5, 0.0)),
        ModulePriority::Verbose => Some(Phenotype::new(5.0, 0.5, 0.5, 1.0)),
        ModulePriority::Best | ModulePriority::Custom(_) => None,
    }
}

/// Project `p` into the selection space used for geometric nearest-neighbor:
/// accuracy stays on its native 0-10 scale (keyword/interpreted targets
/// encode accuracy on that same scale), while latency/cost/usage are
/// normalized to `[0, 1]` against the cloud's bounds so they're comparable
/// to a target whose non-accuracy axes are themselves already `[0, 1]`.
pub fn to_selection_space(p: Phenotype, mins: Phenotype, maxs: Phenotype) -> Phenotype {
    let normalized = neuron_qd_core::phenotype::normalize(p, mins, maxs);
    Phenotype::new(p.accuracy, normalized.latency, normalized.cost, normalized.usage)
}

/// Find the nearest-neighbor module to `target` in selection space.
///
/// Ties break by higher accuracy, then by lower cost (both read from the
/// module's raw, un-normalized phenotype).
pub fn nearest<'a, M>(
    cloud: &'a [(Phenotype, M)],
    target: Phenotype,
) -> Option<&'a M> {
    if cloud.is_empty() {
        return None;
    }
    let raw: Vec<Phenotype> = cloud.iter().map(|(p, _)| *p).collect();
    let (mins, maxs) = neuron_qd_core::phenotype::bounds(&raw);

    let mut best_idx = 0usize;
    let mut best_dist = f64::INFINITY;
    for (i, (p, _)) in cloud.iter().enumerate() {
        let projected = to_selection_space(*p, mins, maxs);
        let dist = neuron_qd_core::phenotype::distance(projected, target);
        if dist < best_dist - f64::EPSILON {
            best_dist = dist;
            best_idx = i;
        } else if (dist - best_dist).abs() <= f64::EPSILON {
            let candidate = cloud[i].0;
            let incumbent = cloud[best_idx].0;
            if candidate.accuracy > incumbent.accuracy
                || (candidate.accuracy == incumbent.accuracy && candidate.cost < incumbent.cost)
            {
                best_idx = i;
                best_dist = dist;
            }
        }
    }
    Some(&cloud[best_idx].1)
}

/// Interprets a free-form priority description into a target [`Phenotype`]
/// via the sender, caching by exact input string to avoid repeated
/// per-turn latency (per the design note in §9 of the spec).
pub struct PriorityInterpreter {
    cache: Mutex<HashMap<String, Phenotype>>,
}

impl Default for PriorityInterpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl PriorityInterpreter {
    /// Construct an interpreter with an empty cache.
    pub fn new() -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Interpret `text` into a target phenotype, using the cache if this
    /// exact string has been interpreted before.
    pub async fn interpret(&self, sender: &dyn Sender, text: &str) -> Phenotype {
        if let Some(cached) = self.cache.lock().await.get(text) {
            return *cached;
        }

        let fallback = Phenotype::new(5.0, 0.5, 0.5, 0.5);
        let prompt = format!(
            "Interpret the following priority description as weights in 0.0-1.0 \
             for accuracy, speed, cost, and brevity. Respond with STRICT JSON: \
             {{\"accuracy\": <0..1>, \"speed\": <0..1>, \"cost\": <0..1>, \"brevity\": <0..1>}}.\n\
             Priority: {text}"
        );
        let phenotype = match sender.send(&prompt, &BTreeMap::new()).await {
            Ok(response) => parse_interpretation(&response.text).unwrap_or(fallback),
            Err(err) => {
                tracing::warn!(error = %err, "priority interpretation sender call failed, using centroid");
                fallback
            }
        };

        self.cache
            .lock()
            .await
            .insert(text.to_string(), phenotype);
        phenotype
    }
}

fn parse_interpretation(text: &str) -> Option<Phenotype> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    let value: serde_json::Value = serde_json::from_str(&text[start..=end]).ok()?;
    let accuracy = value.get("accuracy")?.as_f64()?;
    let speed = value.get("speed")?.as_f64()?;
    let cost = value.get("cost")?.as_f64()?;
    let brevity = value.get("brevity")?.as_f64()?;
    Some(Phenotype::new(
        10.0 * accuracy,
        1.0 - speed,
        1.0 - cost,
        1.0 - brevity,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use neuron_qd_core::{RunMeta, SenderError, SenderResponse};
    use rust_decimal::Decimal;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticSender {
        text: String,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Sender for StaticSender {
        async fn send(
            &self,
            _prompt: &str,
            _params: &BTreeMap<String, serde_json::Value>,
        ) -> Result<SenderResponse, SenderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(SenderResponse {
                text: self.text.clone(),
                meta: RunMeta {
                    model: "m".into(),
                    elapsed_ms: 1,
                    prompt_tokens: 1,
                    completion_tokens: 1,
                    cost: Decimal::ZERO,
                },
            })
        }
    }

    #[tokio::test]
    async fn interpret_caches_by_exact_string() {
        let sender = StaticSender {
            text: r#"{"accuracy": 0.9, "speed": 0.2, "cost": 0.1, "brevity": 0.5}"#.to_string(),
            calls: AtomicUsize::new(0),
        };
        let interp = PriorityInterpreter::new();
        let p1 = interp.interpret(&sender, "be great").await;
        let p2 = interp.interpret(&sender, "be great").await;
        assert_eq!(p1, p2);
        assert_eq!(sender.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn interpret_falls_back_on_bad_json() {
        let sender = StaticSender {
            text: "not json at all".to_string(),
            calls: AtomicUsize::new(0),
        };
        let interp = PriorityInterpreter::new();
        let p = interp.interpret(&sender, "whatever").await;
        assert_eq!(p, Phenotype::new(5.0, 0.5, 0.5, 0.5));
    }
}
