//! The mutable decomposition tree: an arena of nodes keyed by integer id,
//! so checkpoints are a cheap structural snapshot rather than a deep
//! pointer-graph clone.

use crate::error::DecompError;
use neuron_qd_core::Profile;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Stable id of a node within a [`Tree`].
pub type NodeId = u64;

/// Lifecycle status of a decomposition node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    /// Created but not yet started.
    Pending,
    /// Currently executing.
    Running,
    /// Completed successfully.
    Done,
    /// Completed unsuccessfully.
    Failed,
    /// Excluded from future expansion by a rollback or explicit prune.
    Pruned,
}

/// A single node in the decomposition tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// This node's id.
    pub id: NodeId,
    /// The sub-task text.
    pub task: String,
    /// Current lifecycle status.
    pub status: NodeStatus,
    /// Child node ids, in creation order.
    pub children: Vec<NodeId>,
    /// Parent node id; `None` only for the root.
    pub parent: Option<NodeId>,
    /// Result payload, set once the node reaches `Done`.
    pub result: Option<Value>,
    /// Tool profile this node (and any sub-agent executing it) is restricted to.
    pub profile: Profile,
}

/// An arena-backed task tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tree {
    nodes: HashMap<NodeId, Node>,
    root: NodeId,
    next_id: NodeId,
}

impl Tree {
    /// Construct a tree with a single pending root node.
    pub fn new(root_task: impl Into<String>, profile: Profile) -> Self {
        let root = Node {
            id: 0,
            task: root_task.into(),
            status: NodeStatus::Pending,
            children: Vec::new(),
            parent: None,
            result: None,
            profile,
        };
        let mut nodes = HashMap::new();
        nodes.insert(0, root);
        Self {
            nodes,
            root: 0,
            next_id: 1,
        }
    }

    /// The root node's id.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Look up a node by id.
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// Look up a node by id, mutably.
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    /// Add a pending child under `parent`, returning its new id.
    pub fn add_child(
        &mut self,
        parent: NodeId,
        task: impl Into<String>,
        profile: Profile,
    ) -> Result<NodeId, DecompError> {
        if !self.nodes.contains_key(&parent) {
            return Err(DecompError::NodeNotFound(parent));
        }
        let id = self.next_id;
        self.next_id += 1;
        self.nodes.insert(
            id,
            Node {
                id,
                task: task.into(),
                status: NodeStatus::Pending,
                children: Vec::new(),
                parent: Some(parent),
                result: None,
                profile,
            },
        );
        self.nodes.get_mut(&parent).unwrap().children.push(id);
        Ok(id)
    }

    /// Set a node's status directly (no state-machine checks beyond existence).
    pub fn set_status(&mut self, id: NodeId, status: NodeStatus) -> Result<(), DecompError> {
        self.nodes
            .get_mut(&id)
            .map(|n| n.status = status)
            .ok_or(DecompError::NodeNotFound(id))
    }

    /// Set a node's result payload and mark it `Done`.
    pub fn complete(&mut self, id: NodeId, result: Value) -> Result<(), DecompError> {
        let node = self.nodes.get_mut(&id).ok_or(DecompError::NodeNotFound(id))?;
        node.result = Some(result);
        node.status = NodeStatus::Done;
        Ok(())
    }

    /// Mark `id` and its entire subtree `Pruned`, except nodes already
    /// `Done` (done work is retained across rollback/pruning) or already
    /// `Pruned`.
    pub fn prune(&mut self, id: NodeId) -> Result<(), DecompError> {
        if !self.nodes.contains_key(&id) {
            return Err(DecompError::NodeNotFound(id));
        }
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let children = {
                let node = self.nodes.get_mut(&current).unwrap();
                if matches!(node.status, NodeStatus::Pending | NodeStatus::Running) {
                    node.status = NodeStatus::Pruned;
                }
                node.children.clone()
            };
            stack.extend(children);
        }
        Ok(())
    }

    /// Depth of `id` from the root (root is depth 0).
    pub fn depth(&self, id: NodeId) -> Result<usize, DecompError> {
        let mut current = self.nodes.get(&id).ok_or(DecompError::NodeNotFound(id))?;
        let mut depth = 0usize;
        while let Some(parent_id) = current.parent {
            depth += 1;
            current = self.nodes.get(&parent_id).expect("parent must exist");
        }
        Ok(depth)
    }

    /// Maximum depth of any non-pruned node.
    pub fn max_depth(&self) -> usize {
        self.nodes
            .values()
            .filter(|n| n.status != NodeStatus::Pruned)
            .map(|n| self.depth(n.id).unwrap_or(0))
            .max()
            .unwrap_or(0)
    }

    /// Maximum number of non-pruned children at any single node.
    pub fn breadth(&self) -> usize {
        self.nodes
            .values()
            .map(|n| {
                n.children
                    .iter()
                    .filter(|c| {
                        self.nodes
                            .get(c)
                            .map(|child| child.status != NodeStatus::Pruned)
                            .unwrap_or(false)
                    })
                    .count()
            })
            .max()
            .unwrap_or(0)
    }

    /// Count of non-pruned leaf nodes (nodes with no non-pruned children).
    pub fn count_leaves(&self) -> usize {
        self.nodes
            .values()
            .filter(|n| n.status != NodeStatus::Pruned)
            .filter(|n| {
                n.children.iter().all(|c| {
                    self.nodes
                        .get(c)
                        .map(|child| child.status == NodeStatus::Pruned)
                        .unwrap_or(true)
                })
            })
            .count()
    }

    /// Success rate among completed (`Done`/`Failed`) nodes. Defaults to
    /// `1.0` when nothing has completed yet, so an unexplored tree never
    /// trips the `min_success_rate` explosion dimension.
    pub fn success_rate(&self) -> f64 {
        let mut done = 0usize;
        let mut failed = 0usize;
        for n in self.nodes.values() {
            match n.status {
                NodeStatus::Done => done += 1,
                NodeStatus::Failed => failed += 1,
                _ => {}
            }
        }
        let total = done + failed;
        if total == 0 {
            1.0
        } else {
            done as f64 / total as f64
        }
    }
}
