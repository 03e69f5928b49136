// src/dag/graph.rs

use std::collections::BTreeMap;

use tracing::debug;

use crate::engine::TaskName;
use crate::errors::{ModelflowError, Result};

/// One node of the pipeline as handed over by the model compiler.
///
/// `downstreams` is never supplied by the caller; it is filled in by
/// [`DagGraph::from_descriptors`] during reverse-edge construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeDescriptor {
    pub name: TaskName,
    /// Direct dependencies: nodes that must deliver before this one runs.
    pub upstreams: Vec<TaskName>,
    /// Direct dependents: nodes that list this one as an upstream.
    pub downstreams: Vec<TaskName>,
}

impl NodeDescriptor {
    /// Build a descriptor from a name and its upstream names.
    ///
    /// Repeated upstream names collapse into a single edge, keeping the
    /// first occurrence's position.
    pub fn new<I, S>(name: impl Into<TaskName>, upstreams: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<TaskName>,
    {
        let mut deduped: Vec<TaskName> = Vec::new();
        for up in upstreams {
            let up = up.into();
            if !deduped.contains(&up) {
                deduped.push(up);
            }
        }

        Self {
            name: name.into(),
            upstreams: deduped,
            downstreams: Vec::new(),
        }
    }

    /// A node with no upstreams.
    pub fn root(name: impl Into<TaskName>) -> Self {
        Self::new(name, Vec::<TaskName>::new())
    }

    pub fn is_root(&self) -> bool {
        self.upstreams.is_empty()
    }

    pub fn is_leaf(&self) -> bool {
        self.downstreams.is_empty()
    }
}

/// In-memory DAG keyed by node name, holding both edge directions.
///
/// Acyclicity is validated upstream (config validation or the model
/// compiler); here we only fail fast on references to unknown nodes.
/// The graph is read-only once built.
#[derive(Debug, Clone)]
pub struct DagGraph {
    nodes: BTreeMap<TaskName, NodeDescriptor>,
}

impl DagGraph {
    /// Build a graph from a descriptor set, computing downstream edges.
    ///
    /// Fails with [`ModelflowError::UnknownUpstream`] if any node lists an
    /// upstream that is not part of the set, and with
    /// [`ModelflowError::EmptyGraph`] if the set is empty.
    pub fn from_descriptors<I>(descriptors: I) -> Result<Self>
    where
        I: IntoIterator<Item = NodeDescriptor>,
    {
        let mut nodes: BTreeMap<TaskName, NodeDescriptor> = BTreeMap::new();

        // First pass: register nodes, dropping any caller-supplied dependents.
        for mut desc in descriptors {
            desc.downstreams.clear();
            let name = desc.name.clone();
            if nodes.insert(name.clone(), desc).is_some() {
                return Err(ModelflowError::ConfigError(format!(
                    "node '{name}' is defined more than once"
                )));
            }
        }

        if nodes.is_empty() {
            return Err(ModelflowError::EmptyGraph);
        }

        // Second pass: reverse edges.
        let names: Vec<TaskName> = nodes.keys().cloned().collect();
        for name in names {
            let upstreams = nodes
                .get(&name)
                .map(|n| n.upstreams.clone())
                .unwrap_or_default();

            for up in upstreams {
                match nodes.get_mut(&up) {
                    Some(up_node) => up_node.downstreams.push(name.clone()),
                    None => {
                        return Err(ModelflowError::UnknownUpstream {
                            node: name,
                            upstream: up,
                        });
                    }
                }
            }
        }

        debug!(nodes = nodes.len(), "built DAG from descriptors");
        Ok(Self { nodes })
    }

    /// All node names, in lexical order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(|s| s.as_str())
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &NodeDescriptor> {
        self.nodes.values()
    }

    pub fn get(&self, name: &str) -> Option<&NodeDescriptor> {
        self.nodes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Immediate upstreams of a node.
    pub fn upstreams_of(&self, name: &str) -> &[TaskName] {
        self.nodes
            .get(name)
            .map(|n| n.upstreams.as_slice())
            .unwrap_or(&[])
    }

    /// Immediate downstreams of a node.
    pub fn downstreams_of(&self, name: &str) -> &[TaskName] {
        self.nodes
            .get(name)
            .map(|n| n.downstreams.as_slice())
            .unwrap_or(&[])
    }

    /// Nodes with no upstreams.
    pub fn roots(&self) -> impl Iterator<Item = &str> {
        self.nodes
            .values()
            .filter(|n| n.is_root())
            .map(|n| n.name.as_str())
    }

    /// Nodes with no downstreams; their results make up an invocation's answer.
    pub fn leaves(&self) -> impl Iterator<Item = &str> {
        self.nodes
            .values()
            .filter(|n| n.is_leaf())
            .map(|n| n.name.as_str())
    }
}
