// src/engine/debug/mod.rs

//! Debug executor.
//!
//! Runs the graph one node at a time in level order, recording status,
//! timings, results, errors and test outcomes for every node so an
//! introspection layer can inspect a run while it happens or after it
//! finishes.
//!
//! Two ways in:
//! - [`DebugExecutor::execute`] runs one invocation directly.
//! - The [`Scheduler`] impl starts one control loop that drains pushed
//!   invocations sequentially; `stop` is a message on that same queue.
//!
//! Either way at most one invocation executes at a time (`run_lock`), and
//! the node arena sits behind a single `RwLock` that is only held for short,
//! non-async sections.
//!
//! - [`state`] holds the node arena and status enum.
//! - [`snapshot`] holds the serializable views.

pub mod snapshot;
pub mod state;

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Instant;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::dag::{DagGraph, PriorityLevels};
use crate::engine::context::RuntimeContext;
use crate::engine::handle::{
    Completion, CompletionSink, WaitHandle, completion_channel, shutdown_flag,
};
use crate::engine::{InvocationId, LeafResults, Scheduler};
use crate::errors::{ModelflowError, Result};
use crate::task::{BoxFuture, INVOCATION_EDGE, Payload, Task, TaskInputs, TaskSet};

use self::snapshot::{GraphSnapshot, GraphTotals, NodeSnapshot};
use self::state::{DebugGraph, NodeIndex, NodeStatus};

enum DebugCommand {
    Invoke {
        invocation_id: InvocationId,
        payload: Payload,
        sink: CompletionSink,
    },
    Stop,
}

/// Sender into the control loop; `None` once stop has been sent.
type ControlFeed = Arc<tokio::sync::Mutex<Option<mpsc::Sender<DebugCommand>>>>;

enum Lifecycle {
    Built,
    Running { feed: ControlFeed, wait: WaitHandle },
    Stopped { wait: WaitHandle },
}

struct DebugInner {
    ctx: RuntimeContext,
    graph: DagGraph,
    levels: PriorityLevels,
    /// Indexed like the arena in `state`.
    tasks: Vec<Arc<dyn Task>>,
    state: RwLock<DebugGraph>,
    run_lock: tokio::sync::Mutex<()>,
    claimed: Mutex<HashSet<InvocationId>>,
}

/// Single-step, fully observable executor.
pub struct DebugExecutor {
    inner: Arc<DebugInner>,
    lifecycle: Mutex<Lifecycle>,
}

impl fmt::Debug for DebugExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebugExecutor")
            .field("ctx", &self.inner.ctx)
            .field("levels", &self.inner.levels)
            .finish_non_exhaustive()
    }
}

impl DebugExecutor {
    /// Build an executor for a task set, deriving the graph from the tasks.
    pub fn new(ctx: RuntimeContext, tasks: &TaskSet) -> Result<Self> {
        let graph = tasks.graph()?;
        Self::from_graph(ctx, graph, tasks)
    }

    /// Build an executor for an already constructed graph.
    pub fn from_graph(ctx: RuntimeContext, graph: DagGraph, tasks: &TaskSet) -> Result<Self> {
        tasks.ensure_unique()?;
        let levels = PriorityLevels::compute(&graph)?;
        let state = DebugGraph::build(&graph, &levels);

        let mut by_index = Vec::with_capacity(state.nodes().len());
        for node in state.nodes() {
            let task = tasks
                .get(&node.name)
                .ok_or_else(|| ModelflowError::TaskNotFound(node.name.clone()))?;
            by_index.push(task);
        }

        Ok(Self {
            inner: Arc::new(DebugInner {
                ctx,
                graph,
                levels,
                tasks: by_index,
                state: RwLock::new(state),
                run_lock: tokio::sync::Mutex::new(()),
                claimed: Mutex::new(HashSet::new()),
            }),
            lifecycle: Mutex::new(Lifecycle::Built),
        })
    }

    pub fn graph(&self) -> &DagGraph {
        &self.inner.graph
    }

    pub fn levels(&self) -> &PriorityLevels {
        &self.inner.levels
    }

    /// Run one invocation to completion and return its leaf map.
    ///
    /// Waits behind any invocation already executing; never interleaves.
    pub async fn execute(
        &self,
        invocation_id: impl Into<InvocationId>,
        payload: Payload,
    ) -> Result<LeafResults> {
        let invocation_id = invocation_id.into();
        // Released on drop, including when the caller abandons this future.
        let _claim = self.inner.claim(&invocation_id)?;
        let results = self.inner.run_invocation(&invocation_id, payload).await;
        Ok(results)
    }

    /// Whether an invocation is currently executing.
    pub fn is_busy(&self) -> bool {
        self.inner.run_lock.try_lock().is_err()
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        let state = self.inner.read_state();
        GraphSnapshot::capture(&state)
    }

    pub fn node_state(&self, name: &str) -> Option<NodeSnapshot> {
        let state = self.inner.read_state();
        state.lookup(name).map(|n| NodeSnapshot::capture(&state, n))
    }

    pub fn status_of(&self, name: &str) -> Option<NodeStatus> {
        self.inner.read_state().lookup(name).map(|n| n.status)
    }

    pub fn totals(&self) -> GraphTotals {
        GraphTotals::capture(&self.inner.read_state())
    }

    fn running_feed(&self) -> Result<ControlFeed> {
        let lifecycle = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
        match &*lifecycle {
            Lifecycle::Built => Err(ModelflowError::NotRunning),
            Lifecycle::Running { feed, .. } => Ok(Arc::clone(feed)),
            Lifecycle::Stopped { .. } => Err(ModelflowError::Stopped),
        }
    }

    fn begin_stop(&self) -> (Option<ControlFeed>, WaitHandle) {
        let mut lifecycle = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
        match &*lifecycle {
            Lifecycle::Running { feed, wait } => {
                let feed = Arc::clone(feed);
                let wait = wait.clone();
                *lifecycle = Lifecycle::Stopped { wait: wait.clone() };
                (Some(feed), wait)
            }
            Lifecycle::Stopped { wait } => (None, wait.clone()),
            Lifecycle::Built => {
                let (done_tx, wait) = shutdown_flag();
                let _ = done_tx.send(true);
                *lifecycle = Lifecycle::Stopped { wait: wait.clone() };
                (None, wait)
            }
        }
    }
}

impl DebugInner {
    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, DebugGraph> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, DebugGraph> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn claim(&self, invocation_id: &str) -> Result<Claim<'_>> {
        let mut claimed = self.claimed.lock().unwrap_or_else(PoisonError::into_inner);
        if !claimed.insert(invocation_id.to_string()) {
            return Err(ModelflowError::DuplicateInvocation(invocation_id.to_string()));
        }
        Ok(Claim {
            inner: self,
            invocation_id: invocation_id.to_string(),
            handed_off: false,
        })
    }

    fn release(&self, invocation_id: &str) {
        self.claimed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(invocation_id);
    }

    /// Sequential level-by-level run of one invocation.
    async fn run_invocation(&self, invocation_id: &str, payload: Payload) -> LeafResults {
        let _running = self.run_lock.lock().await;

        let order: Vec<Vec<NodeIndex>> = {
            let mut state = self.write_state();
            state.reset(invocation_id);
            state.level_order().to_vec()
        };

        info!(invocation = %invocation_id, levels = order.len(), "debug run started");

        for (level, nodes) in order.iter().enumerate() {
            debug!(invocation = %invocation_id, level, nodes = nodes.len(), "running level");
            for &idx in nodes {
                self.run_node(idx, invocation_id, &payload).await;
            }
        }

        let results: LeafResults = {
            let state = self.read_state();
            state
                .nodes()
                .iter()
                .filter(|n| n.is_leaf())
                .filter_map(|n| n.last_result.clone().map(|r| (n.name.clone(), r)))
                .collect()
        };

        let leaves = self.graph.leaves().count();
        self.ctx
            .observer()
            .invocation_completed(invocation_id, results.len(), leaves);
        results
    }

    async fn run_node(&self, idx: NodeIndex, invocation_id: &str, payload: &Payload) {
        let task = Arc::clone(&self.tasks[idx]);

        let (name, inputs) = {
            let mut state = self.write_state();

            let mut inputs = TaskInputs::new(invocation_id);
            let node = state.node(idx);
            if node.is_root() {
                inputs.insert(INVOCATION_EDGE, payload.clone());
            }
            for &up in &node.upstreams {
                let upstream = state.node(up);
                if let Some(result) = &upstream.last_result {
                    inputs.insert(upstream.name.clone(), result.clone());
                }
            }

            let node = state.node_mut(idx);
            node.status = NodeStatus::InProgress;
            node.started_at = Some(Utc::now());
            (node.name.clone(), inputs)
        };

        let observer = self.ctx.observer();
        observer.node_started(invocation_id, &name);

        let started = Instant::now();
        let outcome = task.execute(inputs).await;
        let elapsed = started.elapsed();

        {
            let mut state = self.write_state();
            let node = state.node_mut(idx);
            node.ended_at = Some(Utc::now());
            node.exec_duration = elapsed;
            match &outcome {
                Ok(result) => {
                    node.last_result = Some(result.clone());
                    node.status = NodeStatus::Success;
                }
                Err(err) => {
                    node.last_result = None;
                    node.last_error = Some(format!("{err:#}"));
                    node.status = NodeStatus::Failed;
                }
            }
        }

        if let Err(err) = &outcome {
            observer.node_failed(invocation_id, &name, err);
            return;
        }
        observer.node_succeeded(invocation_id, &name, elapsed);

        let tests = self.ctx.tests_for(&name);
        if tests.is_empty() {
            return;
        }

        self.write_state().node_mut(idx).status = NodeStatus::Testing;

        let outcomes = task.run_tests(tests).await;
        let passed = outcomes.iter().filter(|o| o.passed).count();
        // A test that produced no outcome counts as failed.
        let failed = tests.len().saturating_sub(passed);

        {
            let mut state = self.write_state();
            let node = state.node_mut(idx);
            node.test_duration = outcomes.iter().map(|o| o.duration).sum();
            node.tests_passed = passed;
            node.tests_failed = failed;
            node.test_outcomes = outcomes;
            if failed == 0 {
                node.status = NodeStatus::Success;
            } else {
                node.status = NodeStatus::Failed;
                node.last_error = Some(format!("{failed} of {} tests failed", tests.len()));
            }
        }

        observer.tests_finished(invocation_id, &name, passed, failed);
    }
}

/// An invocation id reserved in `claimed`; released on drop unless handed
/// to the control loop.
struct Claim<'a> {
    inner: &'a DebugInner,
    invocation_id: InvocationId,
    handed_off: bool,
}

impl Claim<'_> {
    fn hand_off(mut self) {
        self.handed_off = true;
    }
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        if !self.handed_off {
            self.inner.release(&self.invocation_id);
        }
    }
}

async fn control_loop(
    inner: Arc<DebugInner>,
    mut rx: mpsc::Receiver<DebugCommand>,
    done_tx: watch::Sender<bool>,
) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            DebugCommand::Invoke {
                invocation_id,
                payload,
                sink,
            } => {
                let results = inner.run_invocation(&invocation_id, payload).await;
                inner.release(&invocation_id);
                if sink.send(results).is_err() {
                    debug!(invocation = %invocation_id, "completion receiver dropped before delivery");
                }
            }
            DebugCommand::Stop => break,
        }
    }

    info!("debug control loop exited");
    let _ = done_tx.send(true);
}

impl Scheduler for DebugExecutor {
    fn run(&self) -> Result<WaitHandle> {
        let mut lifecycle = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
        match &*lifecycle {
            Lifecycle::Built => {}
            Lifecycle::Running { .. } => return Err(ModelflowError::AlreadyRunning),
            Lifecycle::Stopped { .. } => return Err(ModelflowError::Stopped),
        }

        let (tx, rx) = mpsc::channel(self.inner.ctx.concurrency());
        let (done_tx, wait) = shutdown_flag();
        tokio::spawn(control_loop(Arc::clone(&self.inner), rx, done_tx));

        info!(
            nodes = self.inner.tasks.len(),
            levels = self.inner.levels.len(),
            "debug executor started"
        );

        *lifecycle = Lifecycle::Running {
            feed: Arc::new(tokio::sync::Mutex::new(Some(tx))),
            wait: wait.clone(),
        };
        Ok(wait)
    }

    fn push(
        &self,
        invocation_id: InvocationId,
        payload: Payload,
    ) -> BoxFuture<'_, Result<Completion>> {
        Box::pin(async move {
            let feed = self.running_feed()?;
            let claim = self.inner.claim(&invocation_id)?;

            let (sink, completion) = completion_channel(invocation_id.clone());
            let guard = feed.lock().await;
            let Some(tx) = guard.as_ref() else {
                return Err(ModelflowError::Stopped);
            };

            let cmd = DebugCommand::Invoke {
                invocation_id: invocation_id.clone(),
                payload,
                sink,
            };
            if tx.send(cmd).await.is_err() {
                return Err(ModelflowError::Stopped);
            }
            // The control loop releases the id once the run is delivered.
            claim.hand_off();

            debug!(invocation = %invocation_id, "queued debug invocation");
            Ok(completion)
        })
    }

    fn stop(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let (feed, wait) = self.begin_stop();

            if let Some(feed) = feed {
                let mut guard = feed.lock().await;
                if let Some(tx) = guard.take() {
                    info!("sending stop to debug control loop");
                    let _ = tx.send(DebugCommand::Stop).await;
                }
            }

            wait.wait().await;
            Ok(())
        })
    }
}
