// src/engine/streaming/mod.rs

//! Streaming executor.
//!
//! One Tokio task per graph node, connected by bounded `mpsc` queues along
//! the graph's edges (capacity = the context's concurrency hint). Roots are
//! fed by [`Scheduler::push`]; leaves write into the per-invocation
//! [`record::InvocationRegistry`], and the last leaf of an invocation
//! delivers the aggregated map.
//!
//! - [`worker`] holds the per-node loop (barrier read, execute, fan out).
//! - [`record`] holds the per-invocation result records.

pub mod record;
pub(crate) mod worker;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::dag::{DagGraph, PriorityLevels};
use crate::engine::context::RuntimeContext;
use crate::engine::handle::{Completion, WaitHandle, completion_channel, shutdown_flag};
use crate::engine::transition::TransitionMessage;
use crate::engine::{InvocationId, Scheduler, TaskName};
use crate::errors::{ModelflowError, Result};
use crate::task::{BoxFuture, INVOCATION_EDGE, Payload, Task, TaskSet};

use self::record::{InvocationRegistry, PendingRegistration};
use self::worker::{InputEdge, OutputEdge, Worker};

/// Root-level entry point shared by `push` and `stop`.
///
/// Holding the lock across the whole fan-out keeps every root queue (and
/// therefore every edge) carrying invocations in the same order. `None`
/// once stop has been sent.
struct RootFeed {
    senders: tokio::sync::Mutex<Option<Vec<OutputEdge>>>,
}

enum Lifecycle {
    Built,
    Running { feed: Arc<RootFeed>, wait: WaitHandle },
    Stopped { wait: WaitHandle },
}

/// High-throughput executor: every node runs concurrently, invocations are
/// pipelined through the graph.
pub struct StreamingExecutor {
    ctx: RuntimeContext,
    graph: DagGraph,
    levels: PriorityLevels,
    tasks: HashMap<TaskName, Arc<dyn Task>>,
    registry: Arc<InvocationRegistry>,
    lifecycle: Mutex<Lifecycle>,
}

impl fmt::Debug for StreamingExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingExecutor")
            .field("ctx", &self.ctx)
            .field("levels", &self.levels)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl StreamingExecutor {
    /// Build an executor for a task set, deriving the graph from the tasks.
    pub fn new(ctx: RuntimeContext, tasks: &TaskSet) -> Result<Self> {
        let graph = tasks.graph()?;
        Self::from_graph(ctx, graph, tasks)
    }

    /// Build an executor for an already constructed graph.
    ///
    /// Every node of `graph` must have a task in `tasks`.
    pub fn from_graph(ctx: RuntimeContext, graph: DagGraph, tasks: &TaskSet) -> Result<Self> {
        tasks.ensure_unique()?;
        let levels = PriorityLevels::compute(&graph)?;

        let mut by_name = HashMap::with_capacity(graph.len());
        for name in graph.names() {
            let task = tasks
                .get(name)
                .ok_or_else(|| ModelflowError::TaskNotFound(name.to_string()))?;
            by_name.insert(name.to_string(), task);
        }

        let registry = Arc::new(InvocationRegistry::new(graph.leaves().count()));

        Ok(Self {
            ctx,
            graph,
            levels,
            tasks: by_name,
            registry,
            lifecycle: Mutex::new(Lifecycle::Built),
        })
    }

    pub fn graph(&self) -> &DagGraph {
        &self.graph
    }

    pub fn levels(&self) -> &PriorityLevels {
        &self.levels
    }

    pub fn context(&self) -> &RuntimeContext {
        &self.ctx
    }

    /// Invocations pushed but not yet delivered.
    pub fn in_flight(&self) -> usize {
        self.registry.in_flight()
    }

    fn running_feed(&self) -> Result<Arc<RootFeed>> {
        let lifecycle = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
        match &*lifecycle {
            Lifecycle::Built => Err(ModelflowError::NotRunning),
            Lifecycle::Running { feed, .. } => Ok(Arc::clone(feed)),
            Lifecycle::Stopped { .. } => Err(ModelflowError::Stopped),
        }
    }

    /// Move to `Stopped`, returning the feed to close (if workers were
    /// started and not yet stopped) and the handle to wait on.
    fn begin_stop(&self) -> (Option<Arc<RootFeed>>, WaitHandle) {
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
                // Nothing was started; shutdown is already complete.
                let (done_tx, wait) = shutdown_flag();
                let _ = done_tx.send(true);
                *lifecycle = Lifecycle::Stopped { wait: wait.clone() };
                (None, wait)
            }
        }
    }

    /// Create every queue and spawn one worker per node.
    fn start_workers(&self) -> (Vec<OutputEdge>, JoinSet<()>) {
        let capacity = self.ctx.concurrency();
        let mut inputs: HashMap<TaskName, Vec<InputEdge>> = HashMap::new();
        let mut outputs: HashMap<TaskName, Vec<OutputEdge>> = HashMap::new();
        let mut roots: Vec<OutputEdge> = Vec::new();

        for desc in self.graph.descriptors() {
            if desc.is_root() {
                let (tx, rx) = mpsc::channel(capacity);
                roots.push((desc.name.clone(), tx));
                inputs
                    .entry(desc.name.clone())
                    .or_default()
                    .push((INVOCATION_EDGE.to_string(), rx));
            }

            for up in &desc.upstreams {
                let (tx, rx) = mpsc::channel(capacity);
                outputs
                    .entry(up.clone())
                    .or_default()
                    .push((desc.name.clone(), tx));
                inputs
                    .entry(desc.name.clone())
                    .or_default()
                    .push((up.clone(), rx));
            }
        }

        let mut set = JoinSet::new();
        for (level, names) in self.levels.iter().enumerate() {
            for name in names {
                let Some(task) = self.tasks.get(name) else {
                    // from_graph guarantees a task for every node.
                    continue;
                };
                let worker = Worker {
                    name: name.clone(),
                    level,
                    task: Arc::clone(task),
                    inputs: inputs.remove(name).unwrap_or_default(),
                    outputs: outputs.remove(name).unwrap_or_default(),
                    registry: Arc::clone(&self.registry),
                    observer: Arc::clone(self.ctx.observer()),
                };
                set.spawn(worker.run());
            }
        }

        (roots, set)
    }
}

impl Scheduler for StreamingExecutor {
    fn run(&self) -> Result<WaitHandle> {
        let mut lifecycle = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
        match &*lifecycle {
            Lifecycle::Built => {}
            Lifecycle::Running { .. } => return Err(ModelflowError::AlreadyRunning),
            Lifecycle::Stopped { .. } => return Err(ModelflowError::Stopped),
        }

        let (roots, mut workers) = self.start_workers();
        let (done_tx, wait) = shutdown_flag();

        info!(
            workers = workers.len(),
            roots = roots.len(),
            leaves = self.registry.leaf_count(),
            queue_capacity = self.ctx.concurrency(),
            "streaming executor started"
        );

        tokio::spawn(async move {
            while let Some(res) = workers.join_next().await {
                if let Err(e) = res {
                    error!(error = %e, "worker exited abnormally");
                }
            }
            info!("all streaming workers exited");
            let _ = done_tx.send(true);
        });

        let feed = Arc::new(RootFeed {
            senders: tokio::sync::Mutex::new(Some(roots)),
        });
        *lifecycle = Lifecycle::Running {
            feed,
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
            let (sink, completion) = completion_channel(invocation_id.clone());
            self.registry.register(&invocation_id, sink)?;
            // Dropped without commit (error, or the caller gave up on this
            // future) the record is discarded again.
            let pending = PendingRegistration::new(&self.registry, &invocation_id);

            let senders = feed.senders.lock().await;
            let Some(roots) = senders.as_ref() else {
                return Err(ModelflowError::Stopped);
            };

            // Reserve a slot on every root before sending anything, so the
            // invocation reaches either all roots or none of them.
            let mut permits = Vec::with_capacity(roots.len());
            for (root, tx) in roots {
                match tx.reserve().await {
                    Ok(permit) => permits.push(permit),
                    Err(_) => {
                        warn!(
                            root = %root,
                            invocation = %invocation_id,
                            "root worker gone; rejecting invocation"
                        );
                        return Err(ModelflowError::Stopped);
                    }
                }
            }

            debug!(invocation = %invocation_id, roots = permits.len(), "pushing invocation");
            for permit in permits {
                permit.send(TransitionMessage::data(invocation_id.clone(), payload.clone()));
            }
            pending.commit();

            Ok(completion)
        })
    }

    fn stop(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let (feed, wait) = self.begin_stop();

            if let Some(feed) = feed {
                let mut senders = feed.senders.lock().await;
                if let Some(roots) = senders.take() {
                    info!(roots = roots.len(), "sending stop signal to roots");
                    for (root, tx) in &roots {
                        if tx.send(TransitionMessage::stop()).await.is_err() {
                            debug!(root = %root, "root worker already gone");
                        }
                    }
                    // Dropping the senders closes the root queues.
                }
            }

            wait.wait().await;
            Ok(())
        })
    }
}
