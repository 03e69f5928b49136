// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelflowError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Node '{node}' references unknown upstream '{upstream}'")]
    UnknownUpstream { node: String, upstream: String },

    #[error("Cycle detected in DAG: {0}")]
    DagCycle(String),

    #[error("Graph contains no nodes")]
    EmptyGraph,

    #[error("No task registered for node: {0}")]
    TaskNotFound(String),

    #[error("Scheduler is not running; call run() first")]
    NotRunning,

    #[error("Scheduler is already running")]
    AlreadyRunning,

    #[error("Scheduler has been stopped")]
    Stopped,

    #[error("Invocation already in flight: {0}")]
    DuplicateInvocation(String),

    #[error("Task '{node}' failed: {message}")]
    TaskFailed { node: String, message: String },

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, ModelflowError>;
