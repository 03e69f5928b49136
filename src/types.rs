use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Which executor drives a pipeline.
///
/// - `Streaming`: one worker per node connected by bounded queues; used for
///   production runs (default).
/// - `Debug`: a sequential, level-by-level run that keeps rich per-node state
///   for inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    #[default]
    Streaming,
    Debug,
}

impl FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "streaming" => Ok(ExecutionMode::Streaming),
            "debug" => Ok(ExecutionMode::Debug),
            other => Err(format!(
                "invalid mode: {other} (expected \"streaming\" or \"debug\")"
            )),
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Streaming => f.write_str("streaming"),
            ExecutionMode::Debug => f.write_str("debug"),
        }
    }
}
