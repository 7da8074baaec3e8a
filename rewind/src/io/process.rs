//! Helpers for running child processes with timeouts and bounded output.
//!
//! Both the command generator and the command verifier are external programs
//! whose runtime is unbounded in principle, so every spawn goes through
//! [`run_command_cancellable`], which also stops the child on operator cancel.

use std::fs;
use std::io::{Read, Write};
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

use crate::core::types::CancelFlag;

/// How often a running child is checked against its cancel flag.
const CANCEL_POLL: Duration = Duration::from_millis(100);

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
    pub cancelled: bool,
}

impl CommandOutput {
    pub fn succeeded(&self) -> bool {
        !self.timed_out && !self.cancelled && self.status.success()
    }

    /// Short reason string for a failed run, suitable for operator output.
    pub fn failure_reason(&self, label: &str, timeout: Duration) -> String {
        if self.timed_out {
            return format!("{label} timed out after {}s", timeout.as_secs());
        }
        if self.cancelled {
            return format!("{label} was cancelled");
        }
        let tail = last_line(&self.stderr);
        match (self.status.code(), tail) {
            (Some(code), Some(tail)) => format!("{label} exited with status {code}: {tail}"),
            (Some(code), None) => format!("{label} exited with status {code}"),
            (None, _) => format!("{label} was terminated by a signal"),
        }
    }

    /// Render stdout/stderr into a log body, noting truncation and timeouts.
    pub fn render_log(&self, label: &str) -> String {
        let mut buf = String::new();
        buf.push_str("=== stdout ===\n");
        buf.push_str(&String::from_utf8_lossy(&self.stdout));
        if self.stdout_truncated > 0 {
            buf.push_str(&format!(
                "\n[{label} stdout truncated {} bytes]\n",
                self.stdout_truncated
            ));
        }
        buf.push_str("\n=== stderr ===\n");
        buf.push_str(&String::from_utf8_lossy(&self.stderr));
        if self.stderr_truncated > 0 {
            buf.push_str(&format!(
                "\n[{label} stderr truncated {} bytes]\n",
                self.stderr_truncated
            ));
        }
        if self.timed_out {
            buf.push_str(&format!("\n[{label} timed out]\n"));
        }
        if self.cancelled {
            buf.push_str(&format!("\n[{label} cancelled]\n"));
        }
        buf
    }
}

/// Write a command log, creating its parent directory.
pub fn write_log(path: &Path, body: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create log dir {}", parent.display()))?;
    }
    fs::write(path, body).with_context(|| format!("write log {}", path.display()))
}

/// Run a command with a timeout and capture stdout/stderr without risking pipe deadlocks.
///
/// Output is read concurrently while the child runs. `output_limit_bytes` bounds the amount of
/// stdout/stderr stored in memory (bytes beyond this are discarded while still draining the pipe).
/// On timeout the child is killed and `timed_out` is set; that is not an `Err`.
pub fn run_command_with_timeout(
    cmd: Command,
    stdin: Option<&[u8]>,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    run_command_cancellable(cmd, stdin, timeout, output_limit_bytes, &CancelFlag::default())
}

/// [`run_command_with_timeout`] that also kills the child once `cancel` trips.
///
/// A cancelled run sets `cancelled` on the output rather than returning an `Err`.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), output_limit_bytes))]
pub fn run_command_cancellable(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    timeout: Duration,
    output_limit_bytes: usize,
    cancel: &CancelFlag,
) -> Result<CommandOutput> {
    if stdin.is_some() {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let stdout_handle = thread::spawn(move || read_stream_limited(stdout, output_limit_bytes));
    let stderr_handle = thread::spawn(move || read_stream_limited(stderr, output_limit_bytes));

    // Feed stdin on its own thread so a child that never reads cannot block the timeout.
    let stdin_handle = match stdin {
        Some(input) => {
            let mut child_stdin = child
                .stdin
                .take()
                .ok_or_else(|| anyhow!("stdin was not piped"))?;
            let input = input.to_vec();
            Some(thread::spawn(move || -> Result<()> {
                match child_stdin.write_all(&input) {
                    Ok(()) => Ok(()),
                    // The child may exit without consuming all of its input.
                    Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
                    Err(e) => Err(e).context("write stdin"),
                }
            }))
        }
        None => None,
    };

    let started = Instant::now();
    let mut timed_out = false;
    let mut cancelled = false;
    let status = loop {
        let slice = timeout.saturating_sub(started.elapsed()).min(CANCEL_POLL);
        if let Some(status) = child.wait_timeout(slice).context("wait for command")? {
            break status;
        }
        if cancel.is_cancelled() {
            warn!("command cancelled, killing");
            cancelled = true;
        } else if started.elapsed() >= timeout {
            warn!(
                timeout_secs = timeout.as_secs(),
                "command timed out, killing"
            );
            timed_out = true;
        } else {
            continue;
        }
        child.kill().context("kill command")?;
        break child.wait().context("wait command after kill")?;
    };

    if let Some(handle) = stdin_handle {
        match handle.join() {
            Ok(result) => result?,
            Err(_) => return Err(anyhow!("stdin writer thread panicked")),
        }
    }
    let (stdout, stdout_truncated) = join_output(stdout_handle).context("join stdout")?;
    let (stderr, stderr_truncated) = join_output(stderr_handle).context("join stderr")?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, cancelled, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
        cancelled,
    })
}

fn join_output(handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>) -> Result<(Vec<u8>, usize)> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((buf, truncated))
}

fn last_line(bytes: &[u8]) -> Option<String> {
    String::from_utf8_lossy(bytes)
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}
