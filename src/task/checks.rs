// src/task/checks.rs

//! Data tests attached to nodes (run by the debug executor only).

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A test configured for a node.
///
/// `definition` is opaque to the executors; its meaning belongs to the task
/// implementation (for [`crate::task::ShellTask`] it is a shell command).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub name: String,
    pub definition: String,
}

impl TestCase {
    pub fn new(name: impl Into<String>, definition: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            definition: definition.into(),
        }
    }
}

/// Result of running one [`TestCase`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestOutcome {
    pub name: String,
    pub passed: bool,
    pub duration: Duration,
    /// Failure detail, if any.
    pub message: Option<String>,
}

impl TestOutcome {
    pub fn passed(name: impl Into<String>, duration: Duration) -> Self {
        Self {
            name: name.into(),
            passed: true,
            duration,
            message: None,
        }
    }

    pub fn failed(name: impl Into<String>, duration: Duration, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: false,
            duration,
            message: Some(message.into()),
        }
    }
}
