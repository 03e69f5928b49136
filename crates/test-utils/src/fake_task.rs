use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Value, json};

use modelflow::engine::TaskName;
use modelflow::task::{BoxFuture, Payload, Task, TaskInputs, TestCase, TestOutcome};

/// Shared log of `(node, invocation)` pairs, in execution order.
pub type ExecutionLog = Arc<Mutex<Vec<(String, String)>>>;

pub fn execution_log() -> ExecutionLog {
    Arc::new(Mutex::new(Vec::new()))
}

#[derive(Debug, Clone)]
enum Behaviour {
    /// Return a map describing the node and the edges it received.
    Echo,
    Return(Payload),
    Fail(String),
}

/// In-memory task for executor tests.
///
/// - records every execution in an optional shared log
/// - echoes its inputs, returns a fixed payload, or fails (always or per invocation)
/// - can sleep before finishing to simulate slow work
/// - test outcomes are configured per test name (unlisted tests pass)
#[derive(Debug, Clone)]
pub struct FakeTask {
    name: TaskName,
    upstreams: Vec<TaskName>,
    behaviour: Behaviour,
    delay: Option<Duration>,
    log: Option<ExecutionLog>,
    test_results: HashMap<String, bool>,
    fail_on: HashSet<String>,
}

impl FakeTask {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            upstreams: Vec::new(),
            behaviour: Behaviour::Echo,
            delay: None,
            log: None,
            test_results: HashMap::new(),
            fail_on: HashSet::new(),
        }
    }

    pub fn after(mut self, upstream: &str) -> Self {
        self.upstreams.push(upstream.to_string());
        self
    }

    pub fn returning(mut self, payload: Payload) -> Self {
        self.behaviour = Behaviour::Return(payload);
        self
    }

    pub fn failing(mut self, message: &str) -> Self {
        self.behaviour = Behaviour::Fail(message.to_string());
        self
    }

    /// Fail only for the given invocation; other invocations behave normally.
    pub fn failing_on(mut self, invocation: &str) -> Self {
        self.fail_on.insert(invocation.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn logging_to(mut self, log: ExecutionLog) -> Self {
        self.log = Some(log);
        self
    }

    pub fn with_test_result(mut self, test: &str, passed: bool) -> Self {
        self.test_results.insert(test.to_string(), passed);
        self
    }
}

/// The payload an echoing task produces for the given inputs.
pub fn echo_payload(node: &str, inputs: &TaskInputs) -> Payload {
    let edges: Vec<Value> = inputs.edges().keys().map(|k| json!(k)).collect();
    Payload::map([
        ("node", json!(node)),
        ("invocation", json!(inputs.invocation_id())),
        ("edges", Value::Array(edges)),
    ])
}

impl Task for FakeTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn upstreams(&self) -> &[TaskName] {
        &self.upstreams
    }

    fn execute(&self, inputs: TaskInputs) -> BoxFuture<'_, anyhow::Result<Payload>> {
        Box::pin(async move {
            if let Some(log) = &self.log {
                log.lock()
                    .unwrap()
                    .push((self.name.clone(), inputs.invocation_id().to_string()));
            }

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            if self.fail_on.contains(inputs.invocation_id()) {
                return Err(anyhow::anyhow!(
                    "{} failed for {}",
                    self.name,
                    inputs.invocation_id()
                ));
            }

            match &self.behaviour {
                Behaviour::Echo => Ok(echo_payload(&self.name, &inputs)),
                Behaviour::Return(payload) => Ok(payload.clone()),
                Behaviour::Fail(message) => Err(anyhow::anyhow!("{message}")),
            }
        })
    }

    fn run_tests<'a>(&'a self, tests: &'a [TestCase]) -> BoxFuture<'a, Vec<TestOutcome>> {
        Box::pin(async move {
            tests
                .iter()
                .map(|t| {
                    let passed = self.test_results.get(&t.name).copied().unwrap_or(true);
                    let duration = Duration::from_millis(1);
                    if passed {
                        TestOutcome::passed(t.name.clone(), duration)
                    } else {
                        TestOutcome::failed(t.name.clone(), duration, "assertion failed")
                    }
                })
                .collect()
        })
    }
}
