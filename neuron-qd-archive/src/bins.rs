//! Discrete bin keys and the median-calibrated thresholds that produce them.

use neuron_qd_core::Phenotype;
use serde::{Deserialize, Serialize};

/// Coarse cost label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostBin {
    /// Cost at or below the calibration threshold.
    Cheap,
    /// Cost above the calibration threshold.
    Premium,
}

/// Coarse latency label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LatencyBin {
    /// Latency at or below the calibration threshold.
    Fast,
    /// Latency above the calibration threshold.
    Slow,
}

/// Coarse usage label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageBin {
    /// Usage at or below the calibration threshold.
    Compact,
    /// Usage above the calibration threshold.
    Verbose,
}

/// An ordered `(cost, latency, usage)` bin key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BinKey {
    /// Cost label.
    pub cost: CostBin,
    /// Latency label.
    pub latency: LatencyBin,
    /// Usage label.
    pub usage: UsageBin,
}

/// Per-dimension thresholds used to bin a phenotype.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    /// Cost threshold: at or below is `Cheap`.
    pub cost: f64,
    /// Latency threshold: at or below is `Fast`.
    pub latency: f64,
    /// Usage threshold: at or below is `Compact`.
    pub usage: f64,
}

/// Compute the median of a slice of `f64`, or `None` if empty.
///
/// Even-length slices average the two middle elements. This is the
/// deterministic calibration rule: when a phenotype's coordinate exactly
/// equals its threshold, [`bin_key_for`] resolves the tie to the cheaper/
/// faster/more-compact label (a `<=` comparison), never to the pricier one.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let n = sorted.len();
    Some(if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    })
}

/// Compute the `(cost, latency, usage)` thresholds over `cloud`.
///
/// When `cloud` is empty there is no calibration data; the caller should
/// fall back to the incoming phenotype's own coordinates (see
/// `Archive::insert`), which always resolves to the cheap/fast/compact bin
/// by the `<=` tie rule above.
pub fn thresholds_from_cloud(cloud: &[Phenotype]) -> Option<Thresholds> {
    if cloud.is_empty() {
        return None;
    }
    let costs: Vec<f64> = cloud.iter().map(|p| p.cost).collect();
    let latencies: Vec<f64> = cloud.iter().map(|p| p.latency).collect();
    let usages: Vec<f64> = cloud.iter().map(|p| p.usage).collect();
    Some(Thresholds {
        cost: median(&costs).unwrap(),
        latency: median(&latencies).unwrap(),
        usage: median(&usages).unwrap(),
    })
}

/// Bin `p` under `thresholds`, left-biasing ties to cheap/fast/compact.
pub fn bin_key_for(p: Phenotype, thresholds: Thresholds) -> BinKey {
    BinKey {
        cost: if p.cost <= thresholds.cost {
            CostBin::Cheap
        } else {
            CostBin::Premium
        },
        latency: if p.latency <= thresholds.latency {
            LatencyBin::Fast
        } else {
            LatencyBin::Slow
        },
        usage: if p.usage <= thresholds.usage {
            UsageBin::Compact
        } else {
            UsageBin::Verbose
        },
    }
}
