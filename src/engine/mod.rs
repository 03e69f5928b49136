// src/engine/mod.rs

//! Execution engine for modelflow.
//!
//! Both executors implement [`Scheduler`] and are built once per graph,
//! then reused across many invocations until stopped:
//!
//! - [`streaming`]: one concurrent worker per node, bounded queues on every
//!   edge, used for production runs.
//! - [`debug`]: sequential level-by-level runs with per-node state for
//!   inspection.
//!
//! Shared pieces: [`context`] (explicit runtime context), [`observer`]
//! (execution callbacks), [`transition`] (edge messages) and [`handle`]
//! (completion and shutdown handles).

use std::collections::BTreeMap;

use crate::errors::Result;
use crate::task::{BoxFuture, Payload};

/// Canonical node name type used throughout the engine.
pub type TaskName = String;

/// Identifier of one external request to run the whole graph.
pub type InvocationId = String;

/// What an invocation yields: leaf name → leaf result.
///
/// Leaves whose path failed or was skipped are absent; a partial map is the
/// normal degraded-success case.
pub type LeafResults = BTreeMap<TaskName, Payload>;

pub mod context;
pub mod debug;
pub mod handle;
pub mod observer;
pub mod streaming;
pub mod transition;

pub use context::RuntimeContext;
pub use debug::DebugExecutor;
pub use debug::snapshot::{GraphSnapshot, GraphTotals, NodeSnapshot};
pub use debug::state::NodeStatus;
pub use handle::{Completion, WaitHandle};
pub use observer::{ExecutionObserver, TracingObserver};
pub use streaming::StreamingExecutor;
pub use transition::{Transition, TransitionMessage};

/// Contract shared by both executors.
pub trait Scheduler: Send + Sync {
    /// Start the workers. The returned handle resolves once every worker has
    /// exited after [`Scheduler::stop`].
    fn run(&self) -> Result<WaitHandle>;

    /// Inject one invocation at the root level.
    ///
    /// The returned [`Completion`] receives exactly one leaf map for every
    /// accepted push.
    fn push(&self, invocation_id: InvocationId, payload: Payload)
    -> BoxFuture<'_, Result<Completion>>;

    /// Cooperative shutdown; returns once all workers have observed the stop
    /// and exited. Invocations pushed before the stop still complete.
    fn stop(&self) -> BoxFuture<'_, Result<()>>;
}
