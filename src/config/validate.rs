// src/config/validate.rs

use std::collections::HashSet;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{ModelflowError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = ModelflowError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.config, raw.node))
    }
}

/// Run every check a pipeline definition must pass before the engine sees it.
pub fn validate_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_nodes(cfg)?;
    validate_global_config(cfg)?;
    validate_node_upstreams(cfg)?;
    validate_node_tests(cfg)?;
    validate_dag(cfg)?;
    Ok(())
}

fn ensure_has_nodes(cfg: &RawConfigFile) -> Result<()> {
    if cfg.node.is_empty() {
        return Err(ModelflowError::ConfigError(
            "config must contain at least one [node.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_global_config(cfg: &RawConfigFile) -> Result<()> {
    if cfg.config.concurrency == Some(0) {
        return Err(ModelflowError::ConfigError(
            "[config].concurrency must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_node_upstreams(cfg: &RawConfigFile) -> Result<()> {
    for (name, node) in cfg.node.iter() {
        for up in node.upstreams.iter() {
            if up == name {
                return Err(ModelflowError::ConfigError(format!(
                    "node '{}' cannot list itself in `upstreams`",
                    name
                )));
            }
            if !cfg.node.contains_key(up) {
                return Err(ModelflowError::UnknownUpstream {
                    node: name.clone(),
                    upstream: up.clone(),
                });
            }
        }
    }
    Ok(())
}

fn validate_node_tests(cfg: &RawConfigFile) -> Result<()> {
    for (name, node) in cfg.node.iter() {
        let mut seen = HashSet::new();
        for test in node.tests.iter() {
            if !seen.insert(test.name.as_str()) {
                return Err(ModelflowError::ConfigError(format!(
                    "node '{}' defines test '{}' more than once",
                    name, test.name
                )));
            }
        }
    }
    Ok(())
}

fn validate_dag(cfg: &RawConfigFile) -> Result<()> {
    // Edge direction: upstream -> node.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in cfg.node.keys() {
        graph.add_node(name.as_str());
    }

    for (name, node) in cfg.node.iter() {
        for up in node.upstreams.iter() {
            graph.add_edge(up.as_str(), name.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => {
            let node = cycle.node_id();
            Err(ModelflowError::DagCycle(format!(
                "cycle detected in pipeline DAG involving node '{}'",
                node
            )))
        }
    }
}
