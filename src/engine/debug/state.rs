// src/engine/debug/state.rs

//! Arena-backed mirror of the graph holding per-node runtime state.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::dag::{DagGraph, PriorityLevels};
use crate::engine::{InvocationId, TaskName};
use crate::task::{Payload, TestOutcome};

/// Lifecycle of a node within one debug run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Initial,
    InProgress,
    Testing,
    Failed,
    Success,
}

/// Index of a node in the arena.
pub type NodeIndex = usize;

/// Runtime record for one node.
///
/// Adjacency is stored as arena indices in both directions, so every node
/// can be inspected on its own without reference cycles.
#[derive(Debug, Clone)]
pub struct DebugNode {
    pub name: TaskName,
    pub level: usize,
    pub upstreams: Vec<NodeIndex>,
    pub downstreams: Vec<NodeIndex>,
    pub status: NodeStatus,
    pub last_result: Option<Payload>,
    pub last_error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub exec_duration: Duration,
    pub test_duration: Duration,
    pub tests_passed: usize,
    pub tests_failed: usize,
    pub test_outcomes: Vec<TestOutcome>,
}

impl DebugNode {
    fn new(name: TaskName, level: usize) -> Self {
        Self {
            name,
            level,
            upstreams: Vec::new(),
            downstreams: Vec::new(),
            status: NodeStatus::Initial,
            last_result: None,
            last_error: None,
            started_at: None,
            ended_at: None,
            exec_duration: Duration::ZERO,
            test_duration: Duration::ZERO,
            tests_passed: 0,
            tests_failed: 0,
            test_outcomes: Vec::new(),
        }
    }

    /// Clear everything recorded by a previous run.
    pub fn reset(&mut self) {
        self.status = NodeStatus::Initial;
        self.last_result = None;
        self.last_error = None;
        self.started_at = None;
        self.ended_at = None;
        self.exec_duration = Duration::ZERO;
        self.test_duration = Duration::ZERO;
        self.tests_passed = 0;
        self.tests_failed = 0;
        self.test_outcomes.clear();
    }

    pub fn is_root(&self) -> bool {
        self.upstreams.is_empty()
    }

    pub fn is_leaf(&self) -> bool {
        self.downstreams.is_empty()
    }
}

/// All debug nodes plus the level order they execute in.
#[derive(Debug, Clone)]
pub struct DebugGraph {
    pub(crate) nodes: Vec<DebugNode>,
    pub(crate) index: HashMap<TaskName, NodeIndex>,
    pub(crate) levels: Vec<Vec<NodeIndex>>,
    pub(crate) invocation_id: Option<InvocationId>,
}

impl DebugGraph {
    pub fn build(graph: &DagGraph, levels: &PriorityLevels) -> Self {
        let mut nodes = Vec::with_capacity(graph.len());
        let mut index = HashMap::with_capacity(graph.len());

        for (level, names) in levels.iter().enumerate() {
            for name in names {
                index.insert(name.clone(), nodes.len());
                nodes.push(DebugNode::new(name.clone(), level));
            }
        }

        for desc in graph.descriptors() {
            let Some(&idx) = index.get(&desc.name) else {
                continue;
            };
            nodes[idx].upstreams = desc
                .upstreams
                .iter()
                .filter_map(|n| index.get(n).copied())
                .collect();
            nodes[idx].downstreams = desc
                .downstreams
                .iter()
                .filter_map(|n| index.get(n).copied())
                .collect();
        }

        let levels = levels
            .iter()
            .map(|names| names.iter().filter_map(|n| index.get(n).copied()).collect())
            .collect();

        Self {
            nodes,
            index,
            levels,
            invocation_id: None,
        }
    }

    pub fn reset(&mut self, invocation_id: &str) {
        for node in &mut self.nodes {
            node.reset();
        }
        self.invocation_id = Some(invocation_id.to_string());
    }

    pub fn node(&self, idx: NodeIndex) -> &DebugNode {
        &self.nodes[idx]
    }

    pub fn node_mut(&mut self, idx: NodeIndex) -> &mut DebugNode {
        &mut self.nodes[idx]
    }

    pub fn lookup(&self, name: &str) -> Option<&DebugNode> {
        self.index.get(name).map(|&idx| &self.nodes[idx])
    }

    pub fn nodes(&self) -> &[DebugNode] {
        &self.nodes
    }

    pub fn level_order(&self) -> &[Vec<NodeIndex>] {
        &self.levels
    }

    pub fn invocation_id(&self) -> Option<&str> {
        self.invocation_id.as_deref()
    }
}
