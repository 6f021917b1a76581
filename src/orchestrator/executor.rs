//! Step execution: process spawning, output streaming, exit-code checks.
//!
//! Each external step is one child process. Stdout and stderr are streamed
//! line by line to the caller's output callback while the process runs, and
//! recognizable test-runner milestones are tagged so they can be routed to
//! the parsed log.

use crate::error::{PipelineError, Result};
use crate::models::{CommandSpec, StepKind};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;

/// Which pipe a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// One line of step output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub step: StepKind,
    pub stream: OutputStream,
    pub text: String,
    /// Set when the line is a high-level status event.
    pub milestone: Option<String>,
}

impl OutputLine {
    /// Line as written to the full log.
    pub fn formatted(&self) -> String {
        match self.stream {
            OutputStream::Stdout => self.text.clone(),
            OutputStream::Stderr => format!("[STDERR] {}", self.text),
        }
    }
}

/// Result of a step that exited 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    pub step: StepKind,
    pub exit_code: i32,
    pub lines: usize,
    pub duration: Duration,
}

static GO_PACKAGE_RESULT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(ok|FAIL)\s+(\S+)").expect("valid regex"));
static GO_TEST_FAILURE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*--- FAIL: (\S+)").expect("valid regex"));
static GO_DOWNLOAD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^go: (downloading|finding|added) (\S+)").expect("valid regex"));

/// Recognize milestone lines in toolchain output.
///
/// Matches Go package summaries (`ok`/`FAIL <pkg>`), individual test
/// failures, the bare `PASS`/`FAIL` verdict, and module downloads.
pub fn parse_milestone(line: &str) -> Option<String> {
    let trimmed = line.trim_end();

    if trimmed == "PASS" || trimmed == "FAIL" {
        return Some(format!("Tests: {}", trimmed));
    }

    if let Some(caps) = GO_TEST_FAILURE.captures(trimmed) {
        return Some(format!("Test failed: {}", &caps[1]));
    }

    if let Some(caps) = GO_PACKAGE_RESULT.captures(trimmed) {
        let verdict = if &caps[1] == "ok" { "passed" } else { "FAILED" };
        return Some(format!("Package {} {}", &caps[2], verdict));
    }

    if let Some(caps) = GO_DOWNLOAD.captures(trimmed) {
        return Some(format!("Dependency {}: {}", &caps[1], &caps[2]));
    }

    None
}

/// Run one external step to completion.
///
/// The process runs in `working_dir` with the inherited environment plus
/// `spec.env`. Output lines go to `output_callback` as they arrive. A `true`
/// on `cancel_rx` kills the child and returns `PipelineError::Cancelled`.
///
/// # Errors
/// * `StepSpawn` if the program cannot be started
/// * `StepFailed` if it exits non-zero
/// * `StepTerminated` if it is killed by a signal
pub async fn run_step<F>(
    step: StepKind,
    spec: &CommandSpec,
    working_dir: &Path,
    mut output_callback: F,
    cancel_rx: &mut watch::Receiver<bool>,
) -> Result<StepOutcome>
where
    F: FnMut(OutputLine),
{
    if *cancel_rx.borrow() {
        return Err(PipelineError::Cancelled);
    }

    let started = Instant::now();
    log::debug!("[{}] spawning: {} (in {})", step, spec.display(), working_dir.display());

    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .envs(&spec.env)
        .current_dir(working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn().map_err(|source| PipelineError::StepSpawn {
        step,
        command: spec.display(),
        source,
    })?;

    let stdout = child.stdout.take().ok_or_else(|| PipelineError::StepIo {
        step,
        source: std::io::Error::new(std::io::ErrorKind::BrokenPipe, "failed to capture stdout"),
    })?;
    let stderr = child.stderr.take().ok_or_else(|| PipelineError::StepIo {
        step,
        source: std::io::Error::new(std::io::ErrorKind::BrokenPipe, "failed to capture stderr"),
    })?;

    let mut stdout_lines = BufReader::new(stdout).lines();
    let mut stderr_lines = BufReader::new(stderr).lines();

    let mut stdout_closed = false;
    let mut stderr_closed = false;
    let mut cancel_closed = false;
    let mut line_count = 0_usize;

    let mut emit = |stream: OutputStream, text: String| {
        line_count += 1;
        let milestone = parse_milestone(&text);
        output_callback(OutputLine {
            step,
            stream,
            text,
            milestone,
        });
    };

    while !(stdout_closed && stderr_closed) {
        tokio::select! {
            line = stdout_lines.next_line(), if !stdout_closed => {
                match line {
                    Ok(Some(text)) => emit(OutputStream::Stdout, text),
                    Ok(None) => stdout_closed = true,
                    Err(e) => {
                        log::warn!("[{}] stdout read error: {}", step, e);
                        stdout_closed = true;
                    }
                }
            }
            line = stderr_lines.next_line(), if !stderr_closed => {
                match line {
                    Ok(Some(text)) => emit(OutputStream::Stderr, text),
                    Ok(None) => stderr_closed = true,
                    Err(e) => {
                        log::warn!("[{}] stderr read error: {}", step, e);
                        stderr_closed = true;
                    }
                }
            }
            changed = cancel_rx.changed(), if !cancel_closed => {
                if cancel_requested(changed.is_ok(), cancel_rx, &mut cancel_closed) {
                    return Err(kill_for_cancel(step, &mut child).await);
                }
            }
        }
    }

    // The pipes can close before the process exits (detached stdio), so
    // cancellation stays live while waiting too.
    let status = loop {
        tokio::select! {
            status = child.wait() => {
                break status.map_err(|source| PipelineError::StepIo { step, source })?;
            }
            changed = cancel_rx.changed(), if !cancel_closed => {
                if cancel_requested(changed.is_ok(), cancel_rx, &mut cancel_closed) {
                    return Err(kill_for_cancel(step, &mut child).await);
                }
            }
        }
    };

    let duration = started.elapsed();
    match status.code() {
        Some(0) => Ok(StepOutcome {
            step,
            exit_code: 0,
            lines: line_count,
            duration,
        }),
        Some(code) => Err(PipelineError::StepFailed { step, code }),
        None => Err(PipelineError::StepTerminated {
            step,
            signal: termination_signal(&status),
        }),
    }
}

/// Interpret a wake-up of the cancel channel.
///
/// A closed channel (sender dropped) disables further cancel checks so the
/// select loops do not spin on it.
fn cancel_requested(
    changed: bool,
    cancel_rx: &watch::Receiver<bool>,
    cancel_closed: &mut bool,
) -> bool {
    if !changed {
        *cancel_closed = true;
        return false;
    }
    *cancel_rx.borrow()
}

async fn kill_for_cancel(step: StepKind, child: &mut Child) -> PipelineError {
    log::warn!("[{}] cancellation requested, killing process", step);
    if let Err(e) = child.kill().await {
        log::warn!("[{}] failed to kill process: {}", step, e);
    }
    PipelineError::Cancelled
}

#[cfg(unix)]
fn termination_signal(status: &std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn termination_signal(_status: &std::process::ExitStatus) -> Option<i32> {
    None
}
