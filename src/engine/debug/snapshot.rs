// src/engine/debug/snapshot.rs

//! Serializable views of the debug executor's state, for introspection
//! layers (dashboards, HTTP endpoints, the CLI's JSON output).

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::engine::TaskName;
use crate::engine::debug::state::{DebugGraph, DebugNode, NodeStatus};
use crate::task::{Payload, TestOutcome};

fn as_millis<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

/// State of a single node.
#[derive(Debug, Clone, Serialize)]
pub struct NodeSnapshot {
    pub name: TaskName,
    pub level: usize,
    pub upstreams: Vec<TaskName>,
    pub downstreams: Vec<TaskName>,
    pub status: NodeStatus,
    pub last_result: Option<Payload>,
    pub last_error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(rename = "execution_ms", serialize_with = "as_millis")]
    pub exec_duration: Duration,
    #[serde(rename = "test_ms", serialize_with = "as_millis")]
    pub test_duration: Duration,
    pub tests_passed: usize,
    pub tests_failed: usize,
    pub tests: Vec<TestOutcome>,
}

/// Aggregates over every node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GraphTotals {
    pub nodes: usize,
    pub initial: usize,
    pub in_progress: usize,
    pub testing: usize,
    pub succeeded: usize,
    pub failed: usize,
    #[serde(rename = "execution_ms", serialize_with = "as_millis")]
    pub exec_duration: Duration,
    #[serde(rename = "test_ms", serialize_with = "as_millis")]
    pub test_duration: Duration,
    pub tests_passed: usize,
    pub tests_failed: usize,
}

/// Point-in-time copy of the whole debug graph.
#[derive(Debug, Clone, Serialize)]
pub struct GraphSnapshot {
    pub invocation_id: Option<String>,
    pub levels: Vec<Vec<TaskName>>,
    pub nodes: Vec<NodeSnapshot>,
    pub totals: GraphTotals,
}

impl GraphSnapshot {
    pub fn node(&self, name: &str) -> Option<&NodeSnapshot> {
        self.nodes.iter().find(|n| n.name == name)
    }
}

impl NodeSnapshot {
    pub(crate) fn capture(graph: &DebugGraph, node: &DebugNode) -> Self {
        let names = |idxs: &[usize]| -> Vec<TaskName> {
            idxs.iter().map(|&i| graph.node(i).name.clone()).collect()
        };

        Self {
            name: node.name.clone(),
            level: node.level,
            upstreams: names(&node.upstreams),
            downstreams: names(&node.downstreams),
            status: node.status,
            last_result: node.last_result.clone(),
            last_error: node.last_error.clone(),
            started_at: node.started_at,
            ended_at: node.ended_at,
            exec_duration: node.exec_duration,
            test_duration: node.test_duration,
            tests_passed: node.tests_passed,
            tests_failed: node.tests_failed,
            tests: node.test_outcomes.clone(),
        }
    }
}

impl GraphTotals {
    pub(crate) fn capture(graph: &DebugGraph) -> Self {
        let mut totals = GraphTotals {
            nodes: graph.nodes().len(),
            ..Default::default()
        };

        for node in graph.nodes() {
            match node.status {
                NodeStatus::Initial => totals.initial += 1,
                NodeStatus::InProgress => totals.in_progress += 1,
                NodeStatus::Testing => totals.testing += 1,
                NodeStatus::Success => totals.succeeded += 1,
                NodeStatus::Failed => totals.failed += 1,
            }
            totals.exec_duration += node.exec_duration;
            totals.test_duration += node.test_duration;
            totals.tests_passed += node.tests_passed;
            totals.tests_failed += node.tests_failed;
        }

        totals
    }
}

impl GraphSnapshot {
    pub(crate) fn capture(graph: &DebugGraph) -> Self {
        Self {
            invocation_id: graph.invocation_id().map(str::to_string),
            levels: graph
                .level_order()
                .iter()
                .map(|lvl| lvl.iter().map(|&i| graph.node(i).name.clone()).collect())
                .collect(),
            nodes: graph
                .nodes()
                .iter()
                .map(|n| NodeSnapshot::capture(graph, n))
                .collect(),
            totals: GraphTotals::capture(graph),
        }
    }
}
