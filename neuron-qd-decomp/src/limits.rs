//! Priority-scaled resource limits for a decomposition.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Urgency of a decomposition, driving how generous its [`Limits`] are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecompPriority {
    /// Most generous: deep, wide, expensive trees allowed.
    Critical,
    High,
    /// Default scaling.
    Normal,
    /// Least generous.
    Low,
}

/// Resource ceilings for one decomposition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Limits {
    /// Maximum tree depth.
    pub max_depth: u32,
    /// Maximum breadth (siblings at any one level).
    pub max_breadth: u32,
    /// Maximum accumulated cost.
    pub max_cost: Decimal,
    /// Maximum accumulated context size (tokens).
    pub max_context: u64,
    /// Minimum acceptable success rate.
    pub min_success_rate: f64,
}

/// Compute [`Limits`] for `priority` given a base `budget` and `ctx_limit`,
/// per the spec's scaling table. Unrecognized priorities fall back to the
/// `normal` row (there is no such variant in [`DecompPriority`], but this
/// keeps the function total if the enum ever grows).
pub fn limits_for_priority(priority: DecompPriority, budget: Decimal, ctx_limit: u64) -> Limits {
    let ctx_limit_f = ctx_limit as f64;
    match priority {
        DecompPriority::Critical => Limits {
            max_depth: 10,
            max_breadth: 20,
            max_cost: budget * Decimal::from(2),
            max_context: (ctx_limit_f * 1.5) as u64,
            min_success_rate: 0.60,
        },
        DecompPriority::High => Limits {
            max_depth: 8,
            max_breadth: 15,
            max_cost: budget * Decimal::new(15, 1), // 1.5
            max_context: (ctx_limit_f * 1.0) as u64,
            min_success_rate: 0.70,
        },
        DecompPriority::Normal => Limits {
            max_depth: 6,
            max_breadth: 10,
            max_cost: budget,
            max_context: (ctx_limit_f * 0.8) as u64,
            min_success_rate: 0.75,
        },
        DecompPriority::Low => Limits {
            max_depth: 4,
            max_breadth: 6,
            max_cost: budget * Decimal::new(5, 1), // 0.5
            max_context: (ctx_limit_f * 0.5) as u64,
            min_success_rate: 0.80,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn critical_doubles_budget() {
        let l = limits_for_priority(DecompPriority::Critical, Decimal::from(10), 1000);
        assert_eq!(l.max_cost, Decimal::from(20));
        assert_eq!(l.max_context, 1500);
        assert_eq!(l.max_depth, 10);
    }

    #[test]
    fn low_halves_budget() {
        let l = limits_for_priority(DecompPriority::Low, Decimal::from(10), 1000);
        assert_eq!(l.max_cost, Decimal::from(5));
        assert_eq!(l.max_context, 500);
    }
}
