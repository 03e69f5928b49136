// src/config/model.rs

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;

use crate::engine::RuntimeContext;
use crate::task::{ShellTask, Task, TaskSet, TestCase};
use crate::types::ExecutionMode;

/// Pipeline definition exactly as read from TOML, before validation.
///
/// ```toml
/// [config]
/// concurrency = 4
/// mode = "streaming"
///
/// [node.orders]
/// cmd = "./build_orders.sh"
/// upstreams = ["raw_orders"]
///
/// [[node.orders.test]]
/// name = "not_empty"
/// cmd = "test -s orders.csv"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub config: ConfigSection,

    /// All nodes from `[node.<name>]`, keyed by node name.
    #[serde(default)]
    pub node: BTreeMap<String, NodeConfig>,
}

/// A validated pipeline definition.
///
/// Only obtainable through `TryFrom<RawConfigFile>` (see
/// [`crate::config::validate`]), so holders can rely on: at least one node,
/// known upstream names, no self-dependencies, no cycles.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub config: ConfigSection,
    pub node: BTreeMap<String, NodeConfig>,
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ConfigSection {
    /// Bounded queue capacity per edge; host parallelism if unset.
    #[serde(default)]
    pub concurrency: Option<usize>,

    /// Which executor the binary uses.
    #[serde(default)]
    pub mode: ExecutionMode,
}

/// `[node.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    /// Shell command implementing the node.
    pub cmd: String,

    /// Nodes whose results this node consumes.
    #[serde(default)]
    pub upstreams: Vec<String>,

    /// `[[node.<name>.test]]` entries; only run by the debug executor.
    #[serde(default, rename = "test")]
    pub tests: Vec<TestConfig>,
}

/// `[[node.<name>.test]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct TestConfig {
    pub name: String,
    /// Shell command; exit status 0 means the test passed.
    pub cmd: String,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(config: ConfigSection, node: BTreeMap<String, NodeConfig>) -> Self {
        Self { config, node }
    }

    /// One [`ShellTask`] per node.
    pub fn task_set(&self) -> TaskSet {
        self.node
            .iter()
            .map(|(name, nc)| {
                Arc::new(ShellTask::new(name.clone(), nc.cmd.clone(), nc.upstreams.clone()))
                    as Arc<dyn Task>
            })
            .collect()
    }

    /// Runtime context carrying the concurrency hint and every node's tests.
    ///
    /// `concurrency_override` (e.g. from the CLI) wins over `[config]`.
    pub fn runtime_context(&self, concurrency_override: Option<usize>) -> RuntimeContext {
        let hint = concurrency_override.or(self.config.concurrency);
        let mut ctx = RuntimeContext::new(hint);
        for (name, nc) in &self.node {
            if nc.tests.is_empty() {
                continue;
            }
            let tests = nc
                .tests
                .iter()
                .map(|t| TestCase::new(t.name.clone(), t.cmd.clone()))
                .collect();
            ctx = ctx.with_tests(name.clone(), tests);
        }
        ctx
    }
}
