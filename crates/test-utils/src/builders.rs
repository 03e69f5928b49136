#![allow(dead_code)]

use std::collections::BTreeMap;

use modelflow::config::{ConfigFile, ConfigSection, NodeConfig, RawConfigFile, TestConfig};
use modelflow::dag::NodeDescriptor;
use modelflow::types::ExecutionMode;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                config: ConfigSection::default(),
                node: BTreeMap::new(),
            },
        }
    }

    pub fn with_node(mut self, name: &str, node: NodeConfig) -> Self {
        self.config.node.insert(name.to_string(), node);
        self
    }

    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.config.config.concurrency = Some(n);
        self
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.config.config.mode = mode;
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `NodeConfig`.
pub struct NodeConfigBuilder {
    node: NodeConfig,
}

impl NodeConfigBuilder {
    pub fn new(cmd: &str) -> Self {
        Self {
            node: NodeConfig {
                cmd: cmd.to_string(),
                upstreams: vec![],
                tests: vec![],
            },
        }
    }

    pub fn after(mut self, upstream: &str) -> Self {
        self.node.upstreams.push(upstream.to_string());
        self
    }

    pub fn test(mut self, name: &str, cmd: &str) -> Self {
        self.node.tests.push(TestConfig {
            name: name.to_string(),
            cmd: cmd.to_string(),
        });
        self
    }

    pub fn build(self) -> NodeConfig {
        self.node
    }
}

/// Descriptor set from `(name, upstreams)` pairs.
pub fn descriptors(nodes: &[(&str, &[&str])]) -> Vec<NodeDescriptor> {
    nodes
        .iter()
        .map(|(name, ups)| NodeDescriptor::new(*name, ups.iter().copied()))
        .collect()
}
