// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::default_config_path;
use crate::types::ExecutionMode;

/// Command-line arguments for `modelflow`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "modelflow",
    version,
    about = "Run a pipeline of dependent model tasks as a DAG.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the pipeline definition (TOML).
    #[arg(long, value_name = "PATH", default_value_os_t = default_config_path())]
    pub config: PathBuf,

    /// Executor to use (streaming or debug). Overrides `[config].mode`.
    #[arg(long, value_name = "MODE")]
    pub mode: Option<ExecutionMode>,

    /// Bounded queue capacity per edge. Overrides `[config].concurrency`.
    #[arg(long, value_name = "N")]
    pub concurrency: Option<usize>,

    /// Number of invocations to push through the graph.
    #[arg(long, value_name = "N", default_value_t = 1)]
    pub invocations: usize,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `MODELFLOW_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the levels, but don't execute any node.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
