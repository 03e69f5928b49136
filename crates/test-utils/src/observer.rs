use std::sync::Mutex;
use std::time::Duration;

use modelflow::engine::ExecutionObserver;

/// One observer callback, flattened for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observed {
    Started { invocation: String, node: String },
    Succeeded { invocation: String, node: String },
    Failed { invocation: String, node: String, error: String },
    Skipped { invocation: String, node: String },
    TestsFinished { invocation: String, node: String, passed: usize, failed: usize },
    Completed { invocation: String, delivered: usize, leaves: usize },
    WorkerStopped { node: String },
}

/// Observer that records every callback.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<Observed>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Observed> {
        self.events.lock().unwrap().clone()
    }

    pub fn stopped_workers(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Observed::WorkerStopped { node } => Some(node),
                _ => None,
            })
            .collect()
    }

    pub fn completions(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Observed::Completed { invocation, .. } => Some(invocation),
                _ => None,
            })
            .collect()
    }

    pub fn skipped(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Observed::Skipped { node, .. } => Some(node),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: Observed) {
        self.events.lock().unwrap().push(event);
    }
}

impl ExecutionObserver for RecordingObserver {
    fn node_started(&self, invocation: &str, node: &str) {
        self.push(Observed::Started {
            invocation: invocation.to_string(),
            node: node.to_string(),
        });
    }

    fn node_succeeded(&self, invocation: &str, node: &str, _elapsed: Duration) {
        self.push(Observed::Succeeded {
            invocation: invocation.to_string(),
            node: node.to_string(),
        });
    }

    fn node_failed(&self, invocation: &str, node: &str, error: &anyhow::Error) {
        self.push(Observed::Failed {
            invocation: invocation.to_string(),
            node: node.to_string(),
            error: error.to_string(),
        });
    }

    fn node_skipped(&self, invocation: &str, node: &str) {
        self.push(Observed::Skipped {
            invocation: invocation.to_string(),
            node: node.to_string(),
        });
    }

    fn tests_finished(&self, invocation: &str, node: &str, passed: usize, failed: usize) {
        self.push(Observed::TestsFinished {
            invocation: invocation.to_string(),
            node: node.to_string(),
            passed,
            failed,
        });
    }

    fn invocation_completed(&self, invocation: &str, delivered: usize, leaves: usize) {
        self.push(Observed::Completed {
            invocation: invocation.to_string(),
            delivered,
            leaves,
        });
    }

    fn worker_stopped(&self, node: &str) {
        self.push(Observed::WorkerStopped {
            node: node.to_string(),
        });
    }
}
