//! Decomposition state: tree + running counters + checkpoint stack.

use crate::error::{DecompError, ExplosionReason};
use crate::limits::{DecompPriority, Limits};
use crate::tree::{NodeId, Tree};
use neuron_qd_core::{DecompositionPhenotype, Profile};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A single step recorded in a decomposition's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecompStep {
    /// What kind of step this was.
    pub op: DecompOp,
    /// Free-form arguments (node ids, task text, vote tallies, ...).
    pub args: Value,
    /// Tree depth the step occurred at.
    pub depth: usize,
    /// Tool profile in effect for the step.
    pub profile: Profile,
}

/// The kind of operation a [`DecompStep`] records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecompOp {
    /// Split a task into sub-tasks.
    Decompose,
    /// Hand a sub-task to a sub-agent.
    Spawn,
    /// Run first-to-k voting across parallel samples.
    Vote,
    /// Merge sibling results back into the parent.
    Merge,
    /// Execute a subtree directly rather than decomposing further — used
    /// both for genuinely leaf-sized tasks and for a subtree that was
    /// pruned back after an explosion.
    Inline,
}

/// A checkpoint: a full structural snapshot taken before a risky operation.
#[derive(Debug, Clone)]
struct Checkpoint {
    tree: Tree,
    phenotype: DecompositionPhenotype,
    accumulated_cost: Decimal,
    context_size: u64,
    step_index: usize,
    reason: String,
}

/// Full state of one decomposition in progress.
pub struct DecompositionState {
    /// The original top-level task text.
    pub root_task: String,
    /// Caller-supplied task-type tag (used to pick an archive/module).
    pub task_type: String,
    /// Urgency driving this decomposition's limits.
    pub priority: DecompPriority,
    /// The mutable task tree.
    pub tree: Tree,
    /// The phenotype recomputed after every structural change.
    pub current_phenotype: DecompositionPhenotype,
    /// Resource ceilings for this decomposition.
    pub limits: Limits,
    /// Running cost counter (not derivable from the tree alone).
    pub accumulated_cost: Decimal,
    /// Running context-size counter (not derivable from the tree alone).
    pub context_size: u64,
    /// Append-only record of steps taken.
    pub steps_taken: Vec<DecompStep>,
    /// Free-form metadata.
    pub meta: BTreeMap<String, Value>,
    checkpoint_stack: Vec<Checkpoint>,
}

impl DecompositionState {
    /// Start a fresh decomposition at the given priority.
    pub fn new(
        root_task: impl Into<String>,
        task_type: impl Into<String>,
        priority: DecompPriority,
        profile: Profile,
        budget: Decimal,
        ctx_limit: u64,
    ) -> Self {
        let root_task = root_task.into();
        let tree = Tree::new(root_task.clone(), profile);
        let limits = crate::limits::limits_for_priority(priority, budget, ctx_limit);
        let mut state = Self {
            root_task,
            task_type: task_type.into(),
            priority,
            tree,
            current_phenotype: DecompositionPhenotype::zero(),
            limits,
            accumulated_cost: Decimal::ZERO,
            context_size: 0,
            steps_taken: Vec::new(),
            meta: BTreeMap::new(),
            checkpoint_stack: Vec::new(),
        };
        state.recompute_phenotype();
        state
    }

    /// Number of checkpoints currently on the stack.
    pub fn checkpoint_depth(&self) -> usize {
        self.checkpoint_stack.len()
    }

    /// Recompute `current_phenotype` from the tree plus running counters.
    /// Must be called after every structural or counter change (invariant 3).
    pub fn recompute_phenotype(&mut self) {
        self.current_phenotype = DecompositionPhenotype {
            depth: self.tree.max_depth() as f64,
            breadth: self.tree.breadth() as f64,
            accumulated_cost: self.accumulated_cost_f64(),
            context_size: self.context_size as f64,
            success_rate: self.tree.success_rate(),
        };
    }

    fn accumulated_cost_f64(&self) -> f64 {
        use rust_decimal::prelude::ToPrimitive;
        self.accumulated_cost.to_f64().unwrap_or(0.0)
    }

    /// Snapshot the tree, phenotype and counters, pushing onto the
    /// checkpoint stack. Must be called before any operation that may grow
    /// the tree or spend significant cost.
    pub fn checkpoint(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::info!(reason = %reason, depth = self.checkpoint_stack.len(), "decomposition: checkpoint");
        self.checkpoint_stack.push(Checkpoint {
            tree: self.tree.clone(),
            phenotype: self.current_phenotype,
            accumulated_cost: self.accumulated_cost,
            context_size: self.context_size,
            step_index: self.steps_taken.len(),
            reason,
        });
    }

    /// Pop the most recent checkpoint and restore tree/phenotype/counters
    /// and `steps_taken` to that point. Fails with `no-checkpoint` if the
    /// stack is empty.
    pub fn rollback(&mut self) -> Result<(), DecompError> {
        let cp = self.checkpoint_stack.pop().ok_or(DecompError::NoCheckpoint)?;
        tracing::info!(reason = %cp.reason, "decomposition: rollback");
        self.tree = cp.tree;
        self.current_phenotype = cp.phenotype;
        self.accumulated_cost = cp.accumulated_cost;
        self.context_size = cp.context_size;
        self.steps_taken.truncate(cp.step_index);
        Ok(())
    }

    /// Record cost spent and context consumed, then recompute the phenotype.
    pub fn record_spend(&mut self, cost: Decimal, context_tokens: u64) {
        self.accumulated_cost += cost;
        self.context_size += context_tokens;
        self.recompute_phenotype();
    }

    /// Check `current_phenotype` against `limits`, in the spec's fixed
    /// detection order: depth, breadth, cost, context, low-success.
    pub fn detect_explosion(&self) -> Option<ExplosionReason> {
        let p = &self.current_phenotype;
        let l = &self.limits;
        use rust_decimal::prelude::ToPrimitive;
        if p.depth > l.max_depth as f64 {
            return Some(ExplosionReason::Depth);
        }
        if p.breadth > l.max_breadth as f64 {
            return Some(ExplosionReason::Breadth);
        }
        if p.accumulated_cost > l.max_cost.to_f64().unwrap_or(f64::MAX) {
            return Some(ExplosionReason::Cost);
        }
        if p.context_size > l.max_context as f64 {
            return Some(ExplosionReason::Context);
        }
        if p.success_rate < l.min_success_rate {
            return Some(ExplosionReason::LowSuccess);
        }
        None
    }

    /// Add a child under `parent`, checkpointing first. If the addition
    /// trips [`DecompositionState::detect_explosion`], rolls back to
    /// before the addition, re-adds the same node directly as `Pruned`,
    /// records an `Inline` step for it, and returns
    /// `Err(DecompError::Explosion(reason))`. On success returns the new
    /// node's id and leaves the checkpoint on the stack (callers may prune
    /// it once the subtree completes).
    pub fn try_add_child(
        &mut self,
        parent: NodeId,
        task: impl Into<String>,
        profile: Profile,
    ) -> Result<NodeId, DecompError> {
        let task = task.into();
        self.checkpoint(format!("add_child under {parent}"));
        let child_id = self.tree.add_child(parent, task.clone(), profile)?;
        self.recompute_phenotype();

        if let Some(reason) = self.detect_explosion() {
            tracing::warn!(%reason, "decomposition: explosion detected, rolling back");
            self.rollback()?;
            let pruned_id = self.tree.add_child(parent, task, profile)?;
            self.tree.set_status(pruned_id, crate::tree::NodeStatus::Pruned)?;
            self.recompute_phenotype();
            self.steps_taken.push(DecompStep {
                op: DecompOp::Inline,
                args: serde_json::json!({ "node": pruned_id, "pruned_due_to": reason.to_string() }),
                depth: self.tree.depth(pruned_id).unwrap_or(0),
                profile,
            });
            return Err(DecompError::Explosion(reason));
        }

        Ok(child_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> DecompositionState {
        let mut limits_state = DecompositionState::new(
            "root task",
            "generic",
            DecompPriority::Normal,
            Profile::All,
            Decimal::from(10),
            10_000,
        );
        limits_state.limits.max_breadth = 3;
        limits_state
    }

    #[test]
    fn s3_explosion_rollback_and_prune() {
        let mut s = state();
        let root = s.tree.root();
        s.try_add_child(root, "a", Profile::All).unwrap();
        s.try_add_child(root, "b", Profile::All).unwrap();
        s.try_add_child(root, "c", Profile::All).unwrap();
        assert_eq!(s.tree.breadth(), 3);

        let err = s.try_add_child(root, "d", Profile::All).unwrap_err();
        assert_eq!(err, DecompError::Explosion(ExplosionReason::Breadth));
        assert_eq!(s.tree.breadth(), 3);
        assert_eq!(s.current_phenotype.breadth, 3.0);

        // The three successful adds each leave their checkpoint on the stack
        // (never auto-released); the explosive 4th add's own checkpoint was
        // consumed by its internal rollback, netting to zero.
        assert_eq!(s.checkpoint_depth(), 3);

        // Draining the remaining checkpoints then rolling back again fails.
        for _ in 0..3 {
            s.rollback().unwrap();
        }
        let err2 = s.rollback().unwrap_err();
        assert_eq!(err2, DecompError::NoCheckpoint);
    }

    #[test]
    fn depth_checked_before_breadth() {
        let mut s = state();
        s.limits.max_depth = 0;
        let root = s.tree.root();
        let err = s.try_add_child(root, "a", Profile::All).unwrap_err();
        assert_eq!(err, DecompError::Explosion(ExplosionReason::Depth));
    }

    #[test]
    fn low_success_never_trips_on_an_unexplored_tree() {
        let mut s = state();
        s.limits.min_success_rate = 0.99;
        assert_eq!(s.detect_explosion(), None);
    }

    #[test]
    fn record_spend_updates_phenotype() {
        let mut s = state();
        s.record_spend(Decimal::from(3), 500);
        assert_eq!(s.current_phenotype.accumulated_cost, 3.0);
        assert_eq!(s.current_phenotype.context_size, 500.0);
    }
}
