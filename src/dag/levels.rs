// src/dag/levels.rs

//! Priority levels: groups of nodes ordered so every node sits strictly
//! after all of its upstreams.

use std::collections::HashMap;

use tracing::debug;

use crate::dag::DagGraph;
use crate::engine::TaskName;
use crate::errors::{ModelflowError, Result};

/// Sentinel for "no level assigned yet"; lower than any real level.
const UNSET: i64 = -1;

/// Ordered sequence of node sets.
///
/// `level(n) = 0` for roots, otherwise `1 + max(level(u))` over the
/// upstreams of `n`. Nodes within a level are mutually independent and are
/// stored in lexical order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorityLevels {
    levels: Vec<Vec<TaskName>>,
    by_node: HashMap<TaskName, usize>,
}

impl PriorityLevels {
    /// Compute levels by forward relaxation over downstream edges.
    ///
    /// Every node seeds a candidate level of 0; a node keeps propagating
    /// `level + 1` to its downstreams only while the candidate is strictly
    /// greater than its recorded level. Levels only grow and are bounded by
    /// the node count, so exceeding that bound means the graph has a cycle.
    pub fn compute(graph: &DagGraph) -> Result<Self> {
        let bound = graph.len() as i64;
        let mut priority: HashMap<&str, i64> = graph.names().map(|n| (n, UNSET)).collect();

        for seed in graph.names() {
            let mut stack: Vec<(&str, i64)> = vec![(seed, 0)];

            while let Some((node, level)) = stack.pop() {
                let current = priority.get(node).copied().unwrap_or(UNSET);
                if level <= current {
                    continue;
                }
                if level >= bound {
                    return Err(ModelflowError::DagCycle(format!(
                        "level of node '{node}' exceeds node count {bound}"
                    )));
                }

                priority.insert(node, level);
                for down in graph.downstreams_of(node) {
                    stack.push((down.as_str(), level + 1));
                }
            }
        }

        let max_level = priority.values().copied().max().unwrap_or(UNSET);
        let mut levels: Vec<Vec<TaskName>> = vec![Vec::new(); (max_level + 1).max(0) as usize];
        let mut by_node = HashMap::with_capacity(priority.len());

        // `graph.names()` is lexically ordered, which keeps each level sorted.
        for name in graph.names() {
            let level = priority.get(name).copied().unwrap_or(UNSET);
            if level < 0 {
                // Every node seeds itself at 0, so this cannot happen.
                continue;
            }
            levels[level as usize].push(name.to_string());
            by_node.insert(name.to_string(), level as usize);
        }

        debug!(levels = levels.len(), nodes = by_node.len(), "computed priority levels");
        Ok(Self { levels, by_node })
    }

    pub fn levels(&self) -> &[Vec<TaskName>] {
        &self.levels
    }

    pub fn level_of(&self, name: &str) -> Option<usize> {
        self.by_node.get(name).copied()
    }

    /// Number of levels.
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &[TaskName]> {
        self.levels.iter().map(|l| l.as_slice())
    }

    pub fn into_inner(self) -> Vec<Vec<TaskName>> {
        self.levels
    }
}
