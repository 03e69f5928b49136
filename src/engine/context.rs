// src/engine/context.rs

use std::collections::BTreeMap;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;

use crate::engine::observer::{ExecutionObserver, TracingObserver};
use crate::engine::TaskName;
use crate::task::TestCase;

/// Everything the leveler and executors need from their surroundings.
///
/// Built once by the caller and handed to each executor's constructor;
/// there is no process-wide state.
#[derive(Clone)]
pub struct RuntimeContext {
    /// Bounded queue capacity per edge in the streaming executor.
    concurrency: usize,
    observer: Arc<dyn ExecutionObserver>,
    tests: Arc<BTreeMap<TaskName, Vec<TestCase>>>,
}

impl fmt::Debug for RuntimeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeContext")
            .field("concurrency", &self.concurrency)
            .field("tests", &self.tests)
            .finish_non_exhaustive()
    }
}

impl Default for RuntimeContext {
    fn default() -> Self {
        Self::new(None)
    }
}

impl RuntimeContext {
    /// Create a context from an optional concurrency hint.
    ///
    /// Without a hint the host's available parallelism is used. The value is
    /// clamped to at least 1, as a zero-capacity queue cannot carry messages.
    pub fn new(concurrency_hint: Option<usize>) -> Self {
        let concurrency = concurrency_hint.unwrap_or_else(default_concurrency).max(1);
        Self {
            concurrency,
            observer: Arc::new(TracingObserver),
            tests: Arc::new(BTreeMap::new()),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ExecutionObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Attach tests for a node, replacing any previously attached ones.
    pub fn with_tests(mut self, node: impl Into<TaskName>, tests: Vec<TestCase>) -> Self {
        Arc::make_mut(&mut self.tests).insert(node.into(), tests);
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn observer(&self) -> &Arc<dyn ExecutionObserver> {
        &self.observer
    }

    /// Tests configured for `node` (empty if none).
    pub fn tests_for(&self, node: &str) -> &[TestCase] {
        self.tests.get(node).map(|t| t.as_slice()).unwrap_or(&[])
    }
}

/// Host parallelism, or 1 if it cannot be determined.
pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}
