// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod logging;
pub mod task;
pub mod types;

use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::dag::PriorityLevels;
use crate::engine::{DebugExecutor, NodeStatus, Scheduler, StreamingExecutor};
use crate::errors::ModelflowError;
use crate::task::Payload;
use crate::types::ExecutionMode;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - pipeline loading and validation
/// - graph construction and levelling
/// - the chosen executor (streaming or debug)
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_and_validate(&args.config)
        .with_context(|| format!("loading pipeline from '{}'", args.config.display()))?;

    let tasks = cfg.task_set();
    let graph = tasks.graph()?;
    let levels = PriorityLevels::compute(&graph)?;

    if args.dry_run {
        print_dry_run(&cfg, &levels);
        return Ok(());
    }

    let mode = args.mode.unwrap_or(cfg.config.mode);
    let ctx = cfg.runtime_context(args.concurrency);
    info!(%mode, concurrency = ctx.concurrency(), nodes = graph.len(), "starting pipeline");

    match mode {
        ExecutionMode::Streaming => {
            let executor = Arc::new(StreamingExecutor::from_graph(ctx, graph, &tasks)?);
            drive(executor, args.invocations).await
        }
        ExecutionMode::Debug => {
            let executor = Arc::new(DebugExecutor::from_graph(ctx, graph, &tasks)?);
            drive(Arc::clone(&executor), args.invocations).await?;
            let snapshot = executor.snapshot();
            println!("{}", serde_json::to_string_pretty(&snapshot)?);

            // Debug runs are for inspection; surface the first failure as the exit status.
            if let Some(failed) = snapshot.nodes.iter().find(|n| n.status == NodeStatus::Failed) {
                return Err(ModelflowError::TaskFailed {
                    node: failed.name.clone(),
                    message: failed.last_error.clone().unwrap_or_default(),
                }
                .into());
            }
            Ok(())
        }
    }
}

/// Start a scheduler, push `invocations` runs through it, print each leaf
/// map as one JSON line, then stop and wait for full shutdown.
async fn drive<S: Scheduler + 'static>(scheduler: Arc<S>, invocations: usize) -> Result<()> {
    let wait = scheduler.run()?;

    // Ctrl-C → graceful shutdown.
    {
        let scheduler = Arc::clone(&scheduler);
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            info!("Ctrl-C received; stopping scheduler");
            if let Err(e) = scheduler.stop().await {
                warn!(error = %e, "stop after Ctrl-C failed");
            }
        });
    }

    let mut completions = Vec::with_capacity(invocations);
    for n in 1..=invocations {
        let id = format!("inv-{n}");
        match scheduler.push(id, Payload::Empty).await {
            Ok(completion) => completions.push(completion),
            Err(ModelflowError::Stopped) => {
                warn!("scheduler stopped; not pushing further invocations");
                break;
            }
            Err(e) => return Err(e.into()),
        }
    }

    for completion in completions {
        let id = completion.invocation_id().to_string();
        let results = completion.await?;
        let line = json!({ "invocation": id, "results": results });
        println!("{line}");
    }

    scheduler.stop().await?;
    wait.wait().await;
    debug!("scheduler shut down");
    Ok(())
}

/// Dry-run output: print levels and nodes.
fn print_dry_run(cfg: &ConfigFile, levels: &PriorityLevels) {
    println!("modelflow dry-run");
    println!("  config.mode = {}", cfg.config.mode);
    match cfg.config.concurrency {
        Some(n) => println!("  config.concurrency = {n}"),
        None => println!("  config.concurrency = (host parallelism)"),
    }
    println!();

    println!("levels ({}):", levels.len());
    for (i, level) in levels.iter().enumerate() {
        println!("  {i}: {}", level.join(", "));
    }
    println!();

    println!("nodes ({}):", cfg.node.len());
    for (name, node) in cfg.node.iter() {
        println!("  - {name}");
        println!("      cmd: {}", node.cmd);
        if !node.upstreams.is_empty() {
            println!("      upstreams: {:?}", node.upstreams);
        }
        for test in node.tests.iter() {
            println!("      test {}: {}", test.name, test.cmd);
        }
    }

    debug!("dry-run complete (no execution)");
}
