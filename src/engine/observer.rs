// src/engine/observer.rs

//! Execution observer.
//!
//! Executors report what happens to each node through an
//! [`ExecutionObserver`] taken from the [`crate::engine::RuntimeContext`]
//! instead of logging directly. [`TracingObserver`] is the default and turns
//! every callback into a `tracing` event; tests swap in a recorder.

use std::time::Duration;

use tracing::{debug, info, warn};

/// Callbacks fired by both executors. All methods default to no-ops.
pub trait ExecutionObserver: Send + Sync {
    fn node_started(&self, _invocation: &str, _node: &str) {}

    fn node_succeeded(&self, _invocation: &str, _node: &str, _elapsed: Duration) {}

    fn node_failed(&self, _invocation: &str, _node: &str, _error: &anyhow::Error) {}

    /// The node did not execute because an upstream was skipped or failed.
    fn node_skipped(&self, _invocation: &str, _node: &str) {}

    /// Debug executor only: tests for a node finished.
    fn tests_finished(&self, _invocation: &str, _node: &str, _passed: usize, _failed: usize) {}

    /// An invocation's leaf map was handed to its completion sink.
    fn invocation_completed(&self, _invocation: &str, _delivered: usize, _leaves: usize) {}

    /// A streaming worker observed the stop signal and exited.
    fn worker_stopped(&self, _node: &str) {}
}

/// Observer that emits structured `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl ExecutionObserver for TracingObserver {
    fn node_started(&self, invocation: &str, node: &str) {
        debug!(node = %node, invocation = %invocation, "node started");
    }

    fn node_succeeded(&self, invocation: &str, node: &str, elapsed: Duration) {
        debug!(
            node = %node,
            invocation = %invocation,
            elapsed_ms = elapsed.as_millis() as u64,
            "node succeeded"
        );
    }

    fn node_failed(&self, invocation: &str, node: &str, error: &anyhow::Error) {
        warn!(
            node = %node,
            invocation = %invocation,
            error = %format!("{error:#}"),
            "node failed; skipping its descendants for this invocation"
        );
    }

    fn node_skipped(&self, invocation: &str, node: &str) {
        debug!(node = %node, invocation = %invocation, "node skipped (upstream ignored)");
    }

    fn tests_finished(&self, invocation: &str, node: &str, passed: usize, failed: usize) {
        if failed > 0 {
            warn!(node = %node, invocation = %invocation, passed, failed, "node tests failed");
        } else {
            debug!(node = %node, invocation = %invocation, passed, "node tests passed");
        }
    }

    fn invocation_completed(&self, invocation: &str, delivered: usize, leaves: usize) {
        info!(invocation = %invocation, delivered, leaves, "invocation completed");
    }

    fn worker_stopped(&self, node: &str) {
        debug!(node = %node, "worker stopped");
    }
}
