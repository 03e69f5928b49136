// src/task/mod.rs

//! Task capability consumed by the executors.
//!
//! The executors never know what a task does; generated model code (or
//! [`ShellTask`] for the binary) implements [`Task`] and the executors only
//! call `execute` / `run_tests` and read the node's name and upstreams.
//!
//! - [`payload`] defines the data that flows along edges.
//! - [`checks`] defines node tests and their outcomes.
//! - [`shell`] is a process-backed task used by the `modelflow` binary.

pub mod checks;
pub mod payload;
pub mod shell;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::warn;

use crate::dag::{DagGraph, NodeDescriptor};
use crate::engine::{InvocationId, TaskName};
use crate::errors::{ModelflowError, Result};

pub use checks::{TestCase, TestOutcome};
pub use payload::{Payload, RowSet};
pub use shell::ShellTask;

/// Edge name under which root nodes receive the invocation payload.
pub const INVOCATION_EDGE: &str = "@invocation";

/// Boxed, sendable future used at the trait seams.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Inputs gathered for one execution of a node: one payload per incoming
/// edge, keyed by the upstream's name (or [`INVOCATION_EDGE`] for roots).
#[derive(Debug, Clone, PartialEq)]
pub struct TaskInputs {
    invocation_id: InvocationId,
    edges: BTreeMap<TaskName, Payload>,
}

impl TaskInputs {
    pub fn new(invocation_id: impl Into<InvocationId>) -> Self {
        Self {
            invocation_id: invocation_id.into(),
            edges: BTreeMap::new(),
        }
    }

    pub fn with_edge(mut self, edge: impl Into<TaskName>, payload: Payload) -> Self {
        self.insert(edge, payload);
        self
    }

    pub fn insert(&mut self, edge: impl Into<TaskName>, payload: Payload) {
        self.edges.insert(edge.into(), payload);
    }

    pub fn invocation_id(&self) -> &str {
        &self.invocation_id
    }

    pub fn get(&self, edge: &str) -> Option<&Payload> {
        self.edges.get(edge)
    }

    pub fn edges(&self) -> &BTreeMap<TaskName, Payload> {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

/// A named unit of work with declared upstream dependencies.
///
/// Downstreams are computed by [`DagGraph`], never declared by the task.
pub trait Task: Send + Sync {
    fn name(&self) -> &str;

    fn upstreams(&self) -> &[TaskName];

    /// Run the task's business logic against its gathered inputs.
    fn execute(&self, inputs: TaskInputs) -> BoxFuture<'_, anyhow::Result<Payload>>;

    /// Run the given tests, returning one outcome per test.
    ///
    /// Tasks without tests can rely on the default, which runs nothing.
    fn run_tests<'a>(&'a self, tests: &'a [TestCase]) -> BoxFuture<'a, Vec<TestOutcome>> {
        let _ = tests;
        Box::pin(async { Vec::new() })
    }
}

/// The full set of tasks making up a pipeline, keyed by node name.
#[derive(Clone, Default)]
pub struct TaskSet {
    tasks: BTreeMap<TaskName, Arc<dyn Task>>,
    /// Names registered more than once; building a graph from them fails.
    duplicates: BTreeSet<TaskName>,
}

impl fmt::Debug for TaskSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskSet")
            .field("tasks", &self.tasks.keys().collect::<Vec<_>>())
            .field("duplicates", &self.duplicates)
            .finish()
    }
}

impl TaskSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_task<T: Task + 'static>(mut self, task: T) -> Self {
        self.insert(Arc::new(task));
        self
    }

    /// Register a task.
    ///
    /// A second task under an existing name is kept out of the set and
    /// recorded, so [`TaskSet::graph`] reports the conflict.
    pub fn insert(&mut self, task: Arc<dyn Task>) {
        let name = task.name().to_string();
        if self.tasks.contains_key(&name) {
            warn!(node = %name, "task registered more than once");
            self.duplicates.insert(name);
            return;
        }
        self.tasks.insert(name, task);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Task>> {
        self.tasks.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tasks.keys().map(|s| s.as_str())
    }

    /// Node descriptors derived from each task's name and upstreams.
    pub fn descriptors(&self) -> Vec<NodeDescriptor> {
        self.tasks
            .values()
            .map(|t| NodeDescriptor::new(t.name(), t.upstreams().iter().cloned()))
            .collect()
    }

    /// Build the DAG for this task set.
    pub fn graph(&self) -> Result<DagGraph> {
        self.ensure_unique()?;
        DagGraph::from_descriptors(self.descriptors())
    }

    /// Fails if any task name was registered more than once.
    pub fn ensure_unique(&self) -> Result<()> {
        match self.duplicates.iter().next() {
            Some(name) => Err(ModelflowError::ConfigError(format!(
                "node '{name}' is defined more than once"
            ))),
            None => Ok(()),
        }
    }
}

impl FromIterator<Arc<dyn Task>> for TaskSet {
    fn from_iter<I: IntoIterator<Item = Arc<dyn Task>>>(iter: I) -> Self {
        let mut set = TaskSet::new();
        for task in iter {
            set.insert(task);
        }
        set
    }
}
