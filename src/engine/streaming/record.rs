// src/engine/streaming/record.rs

//! Per-invocation result aggregation for the streaming executor.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, warn};

use crate::engine::handle::CompletionSink;
use crate::engine::observer::ExecutionObserver;
use crate::engine::{InvocationId, LeafResults};
use crate::errors::{ModelflowError, Result};
use crate::task::Payload;

/// Partial results of one in-flight invocation.
///
/// Every leaf worker writes its result (if any) under the record's lock and
/// then decrements `remaining`. The leaf that takes the counter to zero owns
/// delivery.
#[derive(Debug)]
pub struct InvocationRecord {
    remaining: AtomicUsize,
    partial: Mutex<LeafResults>,
    sink: Mutex<Option<CompletionSink>>,
}

impl InvocationRecord {
    pub fn new(leaf_count: usize, sink: CompletionSink) -> Self {
        Self {
            remaining: AtomicUsize::new(leaf_count),
            partial: Mutex::new(LeafResults::new()),
            sink: Mutex::new(Some(sink)),
        }
    }

    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }

    /// Store a leaf's outcome and count it down.
    ///
    /// Returns the accumulated map if this call completed the invocation.
    /// A leaf reporting after the counter already reached zero is ignored.
    pub fn complete_leaf(&self, leaf: &str, result: Option<Payload>) -> Option<LeafResults> {
        if let Some(payload) = result {
            let mut partial = self.partial.lock().unwrap_or_else(PoisonError::into_inner);
            partial.insert(leaf.to_string(), payload);
        }

        match self
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
        {
            Ok(1) => {
                let mut partial = self.partial.lock().unwrap_or_else(PoisonError::into_inner);
                Some(std::mem::take(&mut *partial))
            }
            Ok(_) => None,
            Err(_) => {
                warn!(leaf = %leaf, "leaf reported after invocation already completed");
                None
            }
        }
    }

    fn take_sink(&self) -> Option<CompletionSink> {
        self.sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// All in-flight invocations, keyed by id.
#[derive(Debug)]
pub struct InvocationRegistry {
    leaf_count: usize,
    records: Mutex<HashMap<InvocationId, Arc<InvocationRecord>>>,
}

impl InvocationRegistry {
    pub fn new(leaf_count: usize) -> Self {
        Self {
            leaf_count,
            records: Mutex::new(HashMap::new()),
        }
    }

    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    /// Number of invocations still waiting for leaves.
    pub fn in_flight(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Create the record for a new invocation.
    pub fn register(&self, invocation_id: &str, sink: CompletionSink) -> Result<()> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        if records.contains_key(invocation_id) {
            return Err(ModelflowError::DuplicateInvocation(invocation_id.to_string()));
        }
        records.insert(
            invocation_id.to_string(),
            Arc::new(InvocationRecord::new(self.leaf_count, sink)),
        );
        Ok(())
    }

    /// Drop a record that never made it into the graph.
    pub fn unregister(&self, invocation_id: &str) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(invocation_id);
    }

    /// Record one leaf's outcome; deliver and discard the record if it was
    /// the last leaf. Returns `true` if this call delivered.
    pub fn record_leaf(
        &self,
        invocation_id: &str,
        leaf: &str,
        result: Option<Payload>,
        observer: &dyn ExecutionObserver,
    ) -> bool {
        let record = {
            let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
            records.get(invocation_id).cloned()
        };

        let Some(record) = record else {
            warn!(
                invocation = %invocation_id,
                leaf = %leaf,
                "leaf result for unknown invocation; dropping"
            );
            return false;
        };

        let Some(results) = record.complete_leaf(leaf, result) else {
            return false;
        };

        self.unregister(invocation_id);

        let delivered = results.len();
        match record.take_sink() {
            Some(sink) => {
                if sink.send(results).is_err() {
                    debug!(
                        invocation = %invocation_id,
                        "completion receiver dropped before delivery"
                    );
                }
            }
            None => {
                warn!(invocation = %invocation_id, "completion sink already taken");
                return false;
            }
        }

        observer.invocation_completed(invocation_id, delivered, self.leaf_count);
        true
    }
}

/// A registered invocation whose root fan-out has not finished yet.
///
/// Unregisters the record on drop unless [`PendingRegistration::commit`]
/// was called.
pub(crate) struct PendingRegistration<'a> {
    registry: &'a InvocationRegistry,
    invocation_id: &'a str,
    committed: bool,
}

impl<'a> PendingRegistration<'a> {
    pub(crate) fn new(registry: &'a InvocationRegistry, invocation_id: &'a str) -> Self {
        Self {
            registry,
            invocation_id,
            committed: false,
        }
    }

    /// The invocation reached every root; the record now belongs to the leaves.
    pub(crate) fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for PendingRegistration<'_> {
    fn drop(&mut self) {
        if !self.committed {
            debug!(invocation = %self.invocation_id, "push abandoned before fan-out; dropping record");
            self.registry.unregister(self.invocation_id);
        }
    }
}
