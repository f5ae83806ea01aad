//! Voting configuration and its documented presets.

use serde::{Deserialize, Serialize};

/// Parameters for a first-to-k voting round.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VotingConfig {
    /// How many parallel samples to draw.
    pub n_voters: usize,
    /// Votes a candidate needs to win outright.
    pub k_threshold: usize,
    /// Wall-clock deadline for the round, in milliseconds.
    pub timeout_ms: u64,
    /// Whether to vary temperature/seed across voters to decorrelate samples.
    pub decorrelate: bool,
}

impl VotingConfig {
    /// `(1, 1, 30_000, false)` — a single sample, no real consensus.
    pub const NONE: Self = Self {
        n_voters: 1,
        k_threshold: 1,
        timeout_ms: 30_000,
        decorrelate: false,
    };
    /// `(2, 2, 45_000, true)`.
    pub const LOW: Self = Self {
        n_voters: 2,
        k_threshold: 2,
        timeout_ms: 45_000,
        decorrelate: true,
    };
    /// `(3, 2, 60_000, true)`.
    pub const MEDIUM: Self = Self {
        n_voters: 3,
        k_threshold: 2,
        timeout_ms: 60_000,
        decorrelate: true,
    };
    /// `(5, 3, 90_000, true)`.
    pub const HIGH: Self = Self {
        n_voters: 5,
        k_threshold: 3,
        timeout_ms: 90_000,
        decorrelate: true,
    };
    /// `(7, 4, 120_000, true)`.
    pub const CRITICAL: Self = Self {
        n_voters: 7,
        k_threshold: 4,
        timeout_ms: 120_000,
        decorrelate: true,
    };
}

impl Default for VotingConfig {
    fn default() -> Self {
        Self::NONE
    }
}
