//! External command execution.
//!
//! The reconciler talks to the cluster exclusively through [`CommandRunner`]:
//! production code uses [`ShellRunner`] (real helm/kubectl processes), tests
//! use [`ScriptedRunner`] with pre-configured responses and no system calls.

use async_trait::async_trait;
use kubeprep_common::{ProvisionError, Result};
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};

/// Captured result of one external command.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn ok(stdout: impl Into<String>) -> Self {
        Self { exit_code: 0, stdout: stdout.into(), stderr: String::new() }
    }

    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self { exit_code, stdout: String::new(), stderr: stderr.into() }
    }
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion with a bounded timeout, capturing output.
    async fn run(&self, program: &str, args: &[String], timeout_secs: u64)
        -> Result<CommandOutput>;

    /// Run with a bounded timeout, relaying each output line (stdout and
    /// stderr interleaved, in arrival order) into `lines` while it is
    /// produced. Full output is still captured in the returned value.
    ///
    /// A dropped receiver does not stop the process; the command runs to
    /// completion or its timeout regardless of listener presence.
    async fn run_streaming(
        &self,
        program: &str,
        args: &[String],
        timeout_secs: u64,
        lines: mpsc::Sender<String>,
    ) -> Result<CommandOutput>;
}

/// Production runner backed by real child processes.
pub struct ShellRunner;

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, program: &str, args: &[String], timeout_secs: u64)
        -> Result<CommandOutput> {
        debug!("Executing: {} {}", program, args.join(" "));

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output();

        let output = match timeout(Duration::from_secs(timeout_secs), child).await {
            Ok(result) => result?,
            Err(_) => {
                warn!("{} timed out after {}s", program, timeout_secs);
                return Err(ProvisionError::CommandTimeout {
                    program: program.to_string(),
                    secs: timeout_secs,
                });
            }
        };

        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn run_streaming(
        &self,
        program: &str,
        args: &[String],
        timeout_secs: u64,
        lines: mpsc::Sender<String>,
    ) -> Result<CommandOutput> {
        debug!("Executing (streaming): {} {}", program, args.join(" "));

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ProvisionError::Cluster("child stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ProvisionError::Cluster("child stderr not captured".to_string()))?;

        let out_task = tokio::spawn(relay_lines(stdout, lines.clone()));
        let err_task = tokio::spawn(relay_lines(stderr, lines));

        let status = match timeout(Duration::from_secs(timeout_secs), child.wait()).await {
            Ok(result) => result?,
            Err(_) => {
                warn!("{} timed out after {}s, killing", program, timeout_secs);
                let _ = child.kill().await;
                return Err(ProvisionError::CommandTimeout {
                    program: program.to_string(),
                    secs: timeout_secs,
                });
            }
        };

        let stdout = out_task.await.unwrap_or_default();
        let stderr = err_task.await.unwrap_or_default();

        Ok(CommandOutput {
            exit_code: status.code().unwrap_or(-1),
            stdout,
            stderr,
        })
    }
}

/// Forward lines from a child pipe into the sink, accumulating the full text.
/// Send failures mean the listener went away; the relay keeps draining so the
/// captured output stays complete.
async fn relay_lines<R>(pipe: R, sink: mpsc::Sender<String>) -> String
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(pipe).lines();
    let mut captured = String::new();
    while let Ok(Some(line)) = reader.next_line().await {
        let _ = sink.send(line.clone()).await;
        captured.push_str(&line);
        captured.push('\n');
    }
    captured
}

/// Scripted runner for tests: responses keyed by command-line prefix.
///
/// The first rule whose prefix matches `"<program> <args...>"` wins; unmatched
/// commands succeed with empty output. Every invocation is recorded for
/// assertions.
#[derive(Default)]
pub struct ScriptedRunner {
    rules: Mutex<Vec<(String, CommandOutput)>>,
    errors: Mutex<HashMap<String, u64>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Respond to commands starting with `prefix`.
    pub fn respond(&self, prefix: &str, output: CommandOutput) {
        self.rules
            .lock()
            .unwrap()
            .push((prefix.to_string(), output));
    }

    /// Make commands starting with `prefix` time out.
    pub fn time_out(&self, prefix: &str, secs: u64) {
        self.errors.lock().unwrap().insert(prefix.to_string(), secs);
    }

    /// Every command line this runner has seen, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record_and_lookup(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
        let command_line = if args.is_empty() {
            program.to_string()
        } else {
            format!("{} {}", program, args.join(" "))
        };
        self.calls.lock().unwrap().push(command_line.clone());

        let timed_out = self
            .errors
            .lock()
            .unwrap()
            .iter()
            .find(|(prefix, _)| command_line.starts_with(prefix.as_str()))
            .map(|(_, secs)| *secs);
        if let Some(secs) = timed_out {
            return Err(ProvisionError::CommandTimeout {
                program: program.to_string(),
                secs,
            });
        }

        let rules = self.rules.lock().unwrap();
        let output = rules
            .iter()
            .find(|(prefix, _)| command_line.starts_with(prefix.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or_default();
        Ok(output)
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, program: &str, args: &[String], _timeout_secs: u64)
        -> Result<CommandOutput> {
        self.record_and_lookup(program, args)
    }

    async fn run_streaming(
        &self,
        program: &str,
        args: &[String],
        _timeout_secs: u64,
        lines: mpsc::Sender<String>,
    ) -> Result<CommandOutput> {
        let output = self.record_and_lookup(program, args)?;
        for line in output.stdout.lines() {
            let _ = lines.send(line.to_string()).await;
        }
        Ok(output)
    }
}
