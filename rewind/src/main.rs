//! Reversible single-file code mutation.
//!
//! `rewind apply` asks the configured generator for new content of one file,
//! writes it, runs the verifier, and restores the file if verification fails.
//! `rewind status` shows the tree state and stashes left by earlier attempts.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::debug;

use rewind::attempt::{AttemptRequest, run_attempt};
use rewind::exit_codes;
use rewind::guard::TerminalOperator;
use rewind::io::config::{CONFIG_FILE_NAME, DirtyPolicy, LockMode, RewindConfig, load_config};
use rewind::io::generator::CommandGenerator;
use rewind::io::git::Git;
use rewind::io::verifier::ConfiguredVerifier;
use rewind::logging;
use rewind::status::{collect_status, render_status};

#[derive(Parser)]
#[command(
    name = "rewind",
    version,
    about = "Generate, verify, and roll back single-file code changes"
)]
struct Cli {
    /// Working tree to operate on.
    #[arg(short = 'C', long = "root", global = true, default_value = ".")]
    root: PathBuf,

    /// Config file (defaults to `rewind.toml` in the working tree).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print machine-readable JSON on stdout; operator messages go to stderr.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one attempt: generate, write, verify, roll back on failure.
    Apply(ApplyArgs),
    /// Show uncommitted changes, rewind stashes and recent attempts.
    Status {
        /// Number of recent attempts to list.
        #[arg(long, default_value_t = 5)]
        recent: usize,
    },
}

#[derive(Args)]
struct ApplyArgs {
    /// What the generated content should do.
    task: String,

    /// Target file, relative to the working tree.
    #[arg(short, long)]
    file: PathBuf,

    /// Override `dirty_tree` from the config.
    #[arg(long, value_enum)]
    dirty: Option<DirtyPolicy>,

    /// Override `lock` from the config.
    #[arg(long, value_enum)]
    lock: Option<LockMode>,
}

#[derive(Serialize)]
struct ErrorOutput<'a> {
    error: rewind::core::types::FailureKind,
    message: &'a str,
}

fn main() {
    logging::init();
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let root = cli
        .root
        .canonicalize()
        .with_context(|| format!("resolve working tree {}", cli.root.display()))?;
    let git = Git::new(&root);
    git.ensure_repository()?;

    match cli.command {
        Command::Apply(args) => cmd_apply(&git, &root, cli.config.as_deref(), cli.json, args),
        Command::Status { recent } => cmd_status(&git, recent, cli.json),
    }
}

fn cmd_apply(
    git: &Git,
    root: &Path,
    config_path: Option<&Path>,
    json: bool,
    args: ApplyArgs,
) -> Result<i32> {
    let cfg = resolve_config(root, config_path, &args)?;
    let generator = CommandGenerator::from_env(&cfg.generator, cfg.output_limit_bytes)
        .context("configure generator")?;
    let verifier = ConfiguredVerifier::from_command(&cfg.verifier.command)
        .context("configure verifier")?;
    let operator = if json {
        TerminalOperator::stderr()
    } else {
        TerminalOperator::stdout()
    };
    let request = AttemptRequest::from_config(root, args.task, args.file, &cfg);

    // SIGINT/SIGTERM stop the running child; a written target is then rolled back.
    let cancel = request.cancel.clone();
    ctrlc::set_handler(move || {
        eprintln!("Interrupted; stopping the attempt.");
        cancel.cancel();
    })
    .context("install interrupt handler")?;

    match run_attempt(git, &generator, &verifier, &operator, &request) {
        Ok(report) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
            Ok(exit_codes::for_outcome(report.outcome))
        }
        Err(err) => {
            let message = err.to_string();
            if err.is_fatal() {
                eprintln!("!!! {message}");
                eprintln!("!!! Inspect the working tree before running rewind again.");
            } else {
                eprintln!("{message}");
            }
            if json {
                let out = ErrorOutput {
                    error: err.kind(),
                    message: &message,
                };
                println!("{}", serde_json::to_string_pretty(&out)?);
            }
            Ok(exit_codes::for_failure(err.kind()))
        }
    }
}

fn cmd_status(git: &Git, recent: usize, json: bool) -> Result<i32> {
    let report = collect_status(git, recent)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render_status(&report));
    }
    Ok(exit_codes::OK)
}

/// Load the config file and apply CLI overrides.
fn resolve_config(root: &Path, config_path: Option<&Path>, args: &ApplyArgs) -> Result<RewindConfig> {
    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| root.join(CONFIG_FILE_NAME));
    debug!(path = %path.display(), "loading config");
    let mut cfg = load_config(&path)?;
    if let Some(dirty) = args.dirty {
        cfg.dirty_tree = dirty;
    }
    if let Some(lock) = args.lock {
        cfg.lock = lock;
    }
    Ok(cfg)
}
