//! First-to-k voting consensus across parallel samples, screened by
//! red-flag reliability filters.

mod config;
mod red_flag;
mod voting;

pub use config::VotingConfig;
pub use red_flag::{classify, vote_weight, RedFlagConfig, RedFlagKind, Severity};
pub use voting::{first_to_k, FirstToKOutcome, Sampler};
