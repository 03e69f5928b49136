// src/task/shell.rs

//! Process-backed task.
//!
//! Each execution spawns the node's command through the platform shell,
//! writes the JSON-encoded inputs to its stdin and turns stdout into a
//! [`Payload`]:
//! - a JSON object becomes `Payload::Map`
//! - empty output becomes `Payload::Empty`
//! - anything else becomes `Payload::Map {"stdout": <text>}`
//!
//! A non-zero exit status is an execution error. Tests are commands as
//! well; exit status 0 means the test passed.

use std::process::Stdio;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::engine::TaskName;
use crate::task::{BoxFuture, Payload, Task, TaskInputs, TestCase, TestOutcome};

/// Environment variable carrying the node name.
pub const NODE_ENV: &str = "MODELFLOW_NODE";
/// Environment variable carrying the invocation id.
pub const INVOCATION_ENV: &str = "MODELFLOW_INVOCATION";

#[derive(Debug, Clone)]
pub struct ShellTask {
    name: TaskName,
    cmd: String,
    upstreams: Vec<TaskName>,
}

impl ShellTask {
    pub fn new(name: impl Into<TaskName>, cmd: impl Into<String>, upstreams: Vec<TaskName>) -> Self {
        Self {
            name: name.into(),
            cmd: cmd.into(),
            upstreams,
        }
    }

    pub fn cmd(&self) -> &str {
        &self.cmd
    }

    async fn execute_inner(&self, inputs: TaskInputs) -> Result<Payload> {
        info!(
            node = %self.name,
            invocation = %inputs.invocation_id(),
            cmd = %self.cmd,
            "starting task process"
        );

        let stdin_json = serde_json::to_vec(inputs.edges())
            .with_context(|| format!("encoding inputs for task '{}'", self.name))?;

        let mut cmd = shell_command(&self.cmd);
        cmd.env(NODE_ENV, &self.name)
            .env(INVOCATION_ENV, inputs.invocation_id())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning process for task '{}'", self.name))?;

        // Feed stdin while stdout/stderr are drained, so a command that writes
        // a lot before reading its input cannot fill a pipe and stall.
        let stdin = child.stdin.take();
        let node = &self.name;
        let feed_stdin = async move {
            if let Some(mut stdin) = stdin {
                // A command that never reads stdin closes the pipe early; that is fine.
                if let Err(e) = stdin.write_all(&stdin_json).await {
                    debug!(node = %node, error = %e, "stdin closed before inputs were written");
                }
                // Dropping `stdin` here closes the pipe, signalling end of input.
            }
        };

        let ((), output) = tokio::join!(feed_stdin, child.wait_with_output());
        let output =
            output.with_context(|| format!("waiting for process of task '{}'", self.name))?;

        for line in String::from_utf8_lossy(&output.stderr).lines() {
            debug!(node = %self.name, "stderr: {}", line);
        }

        let code = output.status.code().unwrap_or(-1);
        info!(
            node = %self.name,
            invocation = %inputs.invocation_id(),
            exit_code = code,
            success = output.status.success(),
            "task process exited"
        );

        if !output.status.success() {
            bail!("command for task '{}' exited with code {code}", self.name);
        }

        Ok(parse_stdout(&String::from_utf8_lossy(&output.stdout)))
    }

    async fn run_test(&self, test: &TestCase) -> TestOutcome {
        let started = Instant::now();

        let mut cmd = shell_command(&test.definition);
        cmd.env(NODE_ENV, &self.name)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        match cmd.output().await {
            Ok(output) if output.status.success() => {
                debug!(node = %self.name, test = %test.name, "test passed");
                TestOutcome::passed(&test.name, started.elapsed())
            }
            Ok(output) => {
                let code = output.status.code().unwrap_or(-1);
                let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                warn!(node = %self.name, test = %test.name, exit_code = code, "test failed");
                let message = if stderr.is_empty() {
                    format!("exited with code {code}")
                } else {
                    format!("exited with code {code}: {stderr}")
                };
                TestOutcome::failed(&test.name, started.elapsed(), message)
            }
            Err(e) => {
                warn!(node = %self.name, test = %test.name, error = %e, "could not spawn test");
                TestOutcome::failed(&test.name, started.elapsed(), format!("spawn failed: {e}"))
            }
        }
    }
}

impl Task for ShellTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn upstreams(&self) -> &[TaskName] {
        &self.upstreams
    }

    fn execute(&self, inputs: TaskInputs) -> BoxFuture<'_, anyhow::Result<Payload>> {
        Box::pin(self.execute_inner(inputs))
    }

    fn run_tests<'a>(&'a self, tests: &'a [TestCase]) -> BoxFuture<'a, Vec<TestOutcome>> {
        Box::pin(async move {
            let mut outcomes = Vec::with_capacity(tests.len());
            for test in tests {
                outcomes.push(self.run_test(test).await);
            }
            outcomes
        })
    }
}

/// Build a shell command appropriate for the platform.
fn shell_command(script: &str) -> Command {
    if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(script);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(script);
        c
    }
}

fn parse_stdout(stdout: &str) -> Payload {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Payload::Empty;
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(map)) => Payload::Map(map),
        _ => Payload::map([("stdout", Value::String(trimmed.to_string()))]),
    }
}
