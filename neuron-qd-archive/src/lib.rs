//! The MAP-Elites module archive: a discrete bin map paired with a
//! continuous phenotype point cloud, and the priority-driven selector over
//! it.

mod bins;
mod selector;

pub use bins::{bin_key_for, median, thresholds_from_cloud, BinKey, CostBin, LatencyBin, Thresholds, UsageBin};
pub use selector::{keyword_target, nearest, to_selection_space, ModulePriority, PriorityInterpreter};

use neuron_qd_core::{Module, Phenotype, Sender};
use std::collections::HashMap;
use thiserror::Error;

/// Errors raised by archive selection.
#[non_exhaustive]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ArchiveError {
    /// The archive (or its point cloud) has no modules to select from.
    #[error("archive-empty")]
    Empty,
}

/// A MAP-Elites archive of module variants for one signature.
///
/// Invariants (checked by the test suite, maintained by `insert`):
/// every module in `bin_map` also appears in `point_cloud`; `default_bin_key`
/// is always a key of `bin_map` once `bin_map` is non-empty; each bin holds
/// the highest-scoring module ever inserted into it.
pub struct Archive {
    /// Name of the signature this archive holds variants of.
    pub signature_name: String,
    bin_map: HashMap<BinKey, (f64, Module)>,
    point_cloud: Vec<(Phenotype, Module)>,
    default_bin_key: Option<BinKey>,
    champion_score: Option<f64>,
}

impl Archive {
    /// Construct an empty archive for the named signature.
    pub fn new(signature_name: impl Into<String>) -> Self {
        Self {
            signature_name: signature_name.into(),
            bin_map: HashMap::new(),
            point_cloud: Vec::new(),
            default_bin_key: None,
            champion_score: None,
        }
    }

    /// Current size of the point cloud.
    pub fn len(&self) -> usize {
        self.point_cloud.len()
    }

    /// Whether the archive holds no modules at all.
    pub fn is_empty(&self) -> bool {
        self.point_cloud.is_empty()
    }

    /// Read-only view of the point cloud.
    pub fn point_cloud(&self) -> &[(Phenotype, Module)] {
        &self.point_cloud
    }

    /// The module currently occupying `key`, if any.
    pub fn bin(&self, key: &BinKey) -> Option<(f64, &Module)> {
        self.bin_map.get(key).map(|(s, m)| (*s, m))
    }

    /// The current default (highest-scoring-ever) bin key.
    pub fn default_bin_key(&self) -> Option<BinKey> {
        self.default_bin_key
    }

    /// Insert `module` with observed `score` and `phenotype`.
    ///
    /// Thresholds for binning are recalibrated from the point cloud as it
    /// stood *before* this insert (the spec's "recomputed on every insert"
    /// reads naturally as "using what's been seen so far"). The phenotype
    /// is always appended to the point cloud; the bin only changes
    /// occupant if the incoming score strictly beats the current one.
    pub fn insert(&mut self, module: Module, score: f64, phenotype: Phenotype) {
        let raw_cloud: Vec<Phenotype> = self.point_cloud.iter().map(|(p, _)| *p).collect();
        let thresholds = thresholds_from_cloud(&raw_cloud).unwrap_or(Thresholds {
            cost: phenotype.cost,
            latency: phenotype.latency,
            usage: phenotype.usage,
        });
        let key = bin_key_for(phenotype, thresholds);

        self.point_cloud.push((phenotype, module.clone()));

        let should_replace = match self.bin_map.get(&key) {
            Some((existing_score, _)) => score > *existing_score,
            None => true,
        };
        if should_replace {
            tracing::info!(module_id = %module.id, score, ?key, "archive: bin promotion");
            self.bin_map.insert(key, (score, module.clone()));
        }

        if self.champion_score.map(|c| score > c).unwrap_or(true) {
            tracing::info!(module_id = %module.id, score, ?key, "archive: new champion");
            self.champion_score = Some(score);
            self.default_bin_key = Some(key);
        }
    }

    /// Select a module according to `priority`.
    ///
    /// `Best` returns the champion's module directly. A keyword consults
    /// [`keyword_target`] and runs geometric nearest-neighbor. A
    /// [`ModulePriority::Custom`] description is interpreted via `sender`
    /// and `interpreter` (caching by exact string) before the same
    /// nearest-neighbor search.
    pub async fn select(
        &self,
        priority: &ModulePriority,
        sender: &dyn Sender,
        interpreter: &PriorityInterpreter,
    ) -> Result<&Module, ArchiveError> {
        if self.point_cloud.is_empty() {
            return Err(ArchiveError::Empty);
        }

        if matches!(priority, ModulePriority::Best) {
            let key = self.default_bin_key.ok_or(ArchiveError::Empty)?;
            return self
                .bin_map
                .get(&key)
                .map(|(_, m)| m)
                .ok_or(ArchiveError::Empty);
        }

        let target = match keyword_target(priority) {
            Some(t) => t,
            None => match priority {
                ModulePriority::Custom(text) => interpreter.interpret(sender, text).await,
                _ => unreachable!("Best handled above, all other variants have keyword targets"),
            },
        };

        nearest(&self.point_cloud, target).ok_or(ArchiveError::Empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use neuron_qd_core::{FieldKind, RunMeta, SenderError, SenderResponse, SigField, Signature};
    use rust_decimal::Decimal;
    use std::collections::BTreeMap;

    struct DummySender;

    #[async_trait]
    impl Sender for DummySender {
        async fn send(
            &self,
            _prompt: &str,
            _params: &BTreeMap<String, serde_json::Value>,
        ) -> Result<SenderResponse, SenderError> {
            Ok(SenderResponse {
                text: "{}".to_string(),
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

    fn sig() -> Signature {
        Signature::new(
            "s",
            vec![SigField::new("x", FieldKind::String)],
            vec![SigField::new("y", FieldKind::String)],
        )
        .unwrap()
    }

    fn module(id_suffix: &str) -> Module {
        let mut m = Module::predict(sig(), "i");
        m.id = format!("m-{id_suffix}");
        m
    }

    #[test]
    fn select_s1_keeps_best_per_bin() {
        let mut archive = Archive::new("s");
        let a = module("a");
        let b = module("b");
        let p = Phenotype::new(0.0, 5000.0, 0.1, 300.0);
        archive.insert(a.clone(), 7.0, p);
        archive.insert(b, 5.0, p);

        let key = bin_key_for(
            p,
            Thresholds {
                cost: 0.1,
                latency: 5000.0,
                usage: 300.0,
            },
        );
        let (score, occupant) = archive.bin(&key).unwrap();
        assert_eq!(score, 7.0);
        assert!(occupant.same_identity(&a));
    }

    #[tokio::test]
    async fn select_s2_keyword_routing() {
        let mut archive = Archive::new("s");
        let interp = PriorityInterpreter::new();
        let sender = DummySender;

        let m1 = module("accurate");
        let m2 = module("fast");
        let m3 = module("cheap");
        archive.insert(m1.clone(), 9.0, Phenotype::new(10.0, 400.0, 0.2, 400.0));
        archive.insert(m2.clone(), 6.0, Phenotype::new(6.0, 100.0, 0.3, 500.0));
        archive.insert(m3.clone(), 6.0, Phenotype::new(6.0, 500.0, 0.02, 500.0));

        let fast = archive
            .select(&ModulePriority::Fast, &sender, &interp)
            .await
            .unwrap();
        assert!(fast.same_identity(&m2));

        let cheap = archive
            .select(&ModulePriority::Cheap, &sender, &interp)
            .await
            .unwrap();
        assert!(cheap.same_identity(&m3));

        let accurate = archive
            .select(&ModulePriority::Accurate, &sender, &interp)
            .await
            .unwrap();
        assert!(accurate.same_identity(&m1));
    }

    #[tokio::test]
    async fn empty_archive_select_fails() {
        let archive = Archive::new("s");
        let interp = PriorityInterpreter::new();
        let sender = DummySender;
        let err = archive
            .select(&ModulePriority::Best, &sender, &interp)
            .await
            .unwrap_err();
        assert_eq!(err, ArchiveError::Empty);
    }

    #[tokio::test]
    async fn single_point_cloud_always_wins() {
        let mut archive = Archive::new("s");
        let interp = PriorityInterpreter::new();
        let sender = DummySender;
        let only = module("only");
        archive.insert(only.clone(), 3.0, Phenotype::new(1.0, 1.0, 1.0, 1.0));

        for priority in [
            ModulePriority::Fast,
            ModulePriority::Cheap,
            ModulePriority::Accurate,
            ModulePriority::Concise,
            ModulePriority::Verbose,
            ModulePriority::Best,
        ] {
            let picked = archive.select(&priority, &sender, &interp).await.unwrap();
            assert!(picked.same_identity(&only));
        }
    }

    #[test]
    fn default_bin_key_tracks_global_champion() {
        let mut archive = Archive::new("s");
        archive.insert(module("low"), 2.0, Phenotype::new(1.0, 1.0, 1.0, 1.0));
        archive.insert(module("high"), 9.0, Phenotype::new(1.0, 2.0, 2.0, 2.0));
        let key = archive.default_bin_key().unwrap();
        let (score, _) = archive.bin(&key).unwrap();
        assert_eq!(score, 9.0);
    }
}
