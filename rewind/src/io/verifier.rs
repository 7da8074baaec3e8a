//! Verifier adapters.
//!
//! A verifier classifies the freshly written target as acceptable or not. The
//! controller calls it exactly once per attempt, after the write, and its
//! verdict alone decides between keeping the change and rolling it back.

use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};

use crate::core::types::{CancelFlag, Verdict};
use crate::io::process::{run_command_cancellable, write_log};

#[derive(Debug, Clone)]
pub struct VerifyRequest {
    /// Working-tree root; command verifiers run here.
    pub workdir: PathBuf,
    /// Target path relative to `workdir`.
    pub target: PathBuf,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
    /// Where to write the verifier's stdout/stderr, if anywhere.
    pub log_path: Option<PathBuf>,
    pub cancel: CancelFlag,
}

pub trait Verifier {
    fn verify(&self, request: &VerifyRequest) -> Result<Verdict>;
}

/// Built-in check: the target exists, is a regular file and is non-empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExistsVerifier;

impl Verifier for ExistsVerifier {
    fn verify(&self, request: &VerifyRequest) -> Result<Verdict> {
        let path = request.workdir.join(&request.target);
        let meta = match fs::metadata(&path) {
            Ok(meta) => meta,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Verdict::fail(format!("{} does not exist", path.display())));
            }
            Err(err) => return Err(err).with_context(|| format!("stat {}", path.display())),
        };
        if !meta.is_file() {
            return Ok(Verdict::fail(format!("{} is not a file", path.display())));
        }
        if meta.len() == 0 {
            return Ok(Verdict::fail(format!("{} is empty", path.display())));
        }
        debug!(bytes = meta.len(), "target exists");
        Ok(Verdict::Pass)
    }
}

/// Runs a configured command (build, tests, lint) and passes on exit status 0.
#[derive(Debug, Clone)]
pub struct CommandVerifier {
    program: String,
    args: Vec<String>,
}

impl CommandVerifier {
    pub fn new(command: &[String]) -> Result<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| anyhow!("verifier command is empty"))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

impl Verifier for CommandVerifier {
    #[instrument(skip_all, fields(program = %self.program, timeout_secs = request.timeout.as_secs()))]
    fn verify(&self, request: &VerifyRequest) -> Result<Verdict> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .env("REWIND_TARGET", &request.target)
            .current_dir(&request.workdir);

        let output = run_command_cancellable(
            cmd,
            None,
            request.timeout,
            request.output_limit_bytes,
            &request.cancel,
        )
        .with_context(|| format!("run verifier {}", self.program))?;

        if let Some(log_path) = &request.log_path {
            write_log(log_path, &output.render_log("verifier"))?;
        }

        if output.succeeded() {
            return Ok(Verdict::Pass);
        }
        let reason = output.failure_reason("verifier", request.timeout);
        warn!(%reason, "verification failed");
        Ok(Verdict::fail(reason))
    }
}

/// Verifier chosen from configuration: the command if one is set, else the existence check.
#[derive(Debug, Clone)]
pub enum ConfiguredVerifier {
    Exists(ExistsVerifier),
    Command(CommandVerifier),
}

impl ConfiguredVerifier {
    pub fn from_command(command: &[String]) -> Result<Self> {
        if command.is_empty() {
            return Ok(ConfiguredVerifier::Exists(ExistsVerifier));
        }
        Ok(ConfiguredVerifier::Command(CommandVerifier::new(command)?))
    }
}

impl Verifier for ConfiguredVerifier {
    fn verify(&self, request: &VerifyRequest) -> Result<Verdict> {
        match self {
            ConfiguredVerifier::Exists(v) => v.verify(request),
            ConfiguredVerifier::Command(v) => v.verify(request),
        }
    }
}
