//! Change generator boundary.
//!
//! The [`Generator`] trait decouples the attempt controller from whatever
//! produces replacement content (a hosted model behind a CLI, a script, a test
//! double). The controller only sees `Ok(content)` or an error.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use minijinja::{Environment, context};
use tracing::{debug, info, instrument, warn};

use crate::core::types::CancelFlag;
use crate::io::config::GeneratorConfig;
use crate::io::process::run_command_cancellable;

/// Parameters for one generation call.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    /// Working-tree root; the generator process runs here.
    pub workdir: PathBuf,
    /// Free-text task description from the operator.
    pub task: String,
    /// Target path relative to `workdir`.
    pub target: PathBuf,
    /// Maximum time to wait for content.
    pub timeout: Duration,
    /// Kills the generator process when tripped.
    pub cancel: CancelFlag,
}

/// Produces replacement content for one target path.
pub trait Generator {
    /// Return the full new content of `request.target`.
    fn generate(&self, request: &GenerateRequest) -> Result<String>;
}

/// Generator that pipes a rendered prompt into an external command and reads
/// the file content from its stdout.
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    program: String,
    args: Vec<String>,
    template: String,
    env: BTreeMap<String, String>,
    output_limit_bytes: usize,
}

impl CommandGenerator {
    /// Build from config, capturing required environment variables through `lookup`.
    ///
    /// Fails if the command is empty, the template does not parse, or a required
    /// variable is unset.
    pub fn from_config<F>(
        config: &GeneratorConfig,
        output_limit_bytes: usize,
        lookup: F,
    ) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let (program, args) = config
            .command
            .split_first()
            .ok_or_else(|| anyhow!("generator.command is empty"))?;

        let mut env = BTreeMap::new();
        let mut missing = Vec::new();
        for name in &config.required_env {
            match lookup(name) {
                Some(value) if !value.trim().is_empty() => {
                    env.insert(name.clone(), value);
                }
                _ => missing.push(name.as_str()),
            }
        }
        if !missing.is_empty() {
            return Err(anyhow!(
                "missing required environment for generator: {}",
                missing.join(", ")
            ));
        }

        let generator = Self {
            program: program.clone(),
            args: args.to_vec(),
            template: config.prompt_template.clone(),
            env,
            output_limit_bytes,
        };
        // Surface template syntax errors at startup rather than mid-attempt.
        generator
            .render_prompt("", &PathBuf::new())
            .context("invalid generator.prompt_template")?;
        Ok(generator)
    }

    /// Build from config using the process environment.
    pub fn from_env(config: &GeneratorConfig, output_limit_bytes: usize) -> Result<Self> {
        Self::from_config(config, output_limit_bytes, |name| std::env::var(name).ok())
    }

    pub fn render_prompt(&self, task: &str, target: &std::path::Path) -> Result<String> {
        let env = Environment::new();
        let template = env
            .template_from_str(&self.template)
            .context("parse prompt template")?;
        let rendered = template
            .render(context! {
                task => task.trim(),
                target => target.display().to_string(),
            })
            .context("render prompt template")?;
        Ok(rendered)
    }
}

impl Generator for CommandGenerator {
    #[instrument(skip_all, fields(program = %self.program, timeout_secs = request.timeout.as_secs()))]
    fn generate(&self, request: &GenerateRequest) -> Result<String> {
        info!(target = %request.target.display(), "requesting generated content");
        let prompt = self.render_prompt(&request.task, &request.target)?;

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(&self.env)
            .current_dir(&request.workdir);

        let output = run_command_cancellable(
            cmd,
            Some(prompt.as_bytes()),
            request.timeout,
            self.output_limit_bytes,
            &request.cancel,
        )
        .with_context(|| format!("run generator {}", self.program))?;

        if !output.succeeded() {
            let reason = output.failure_reason("generator", request.timeout);
            warn!(%reason, "generator failed");
            return Err(anyhow!(reason));
        }
        if output.stdout_truncated > 0 {
            // A truncated file is partial content; never hand it to the applicator.
            return Err(anyhow!(
                "generator output exceeded {} bytes",
                self.output_limit_bytes
            ));
        }
        let content = String::from_utf8(output.stdout).context("generator output is not UTF-8")?;
        debug!(bytes = content.len(), "generator produced content");
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(command: &[&str]) -> GeneratorConfig {
        GeneratorConfig {
            command: command.iter().map(|s| s.to_string()).collect(),
            required_env: Vec::new(),
            ..GeneratorConfig::default()
        }
    }

    fn request(workdir: &std::path::Path) -> GenerateRequest {
        GenerateRequest {
            workdir: workdir.to_path_buf(),
            task: "add a greeting".to_string(),
            target: PathBuf::from("src/hello.txt"),
            timeout: Duration::from_secs(5),
            cancel: CancelFlag::default(),
        }
    }

    #[test]
    fn missing_required_env_is_rejected() {
        let mut cfg = config(&["cat"]);
        cfg.required_env = vec!["ANTHROPIC_API_KEY".to_string()];
        let err = CommandGenerator::from_config(&cfg, 1024, |_| None).unwrap_err();
        assert!(err.to_string().contains("ANTHROPIC_API_KEY"));
    }

    #[test]
    fn blank_required_env_counts_as_missing() {
        let mut cfg = config(&["cat"]);
        cfg.required_env = vec!["TOKEN".to_string()];
        assert!(CommandGenerator::from_config(&cfg, 1024, |_| Some("  ".to_string())).is_err());
    }

    #[test]
    fn default_prompt_mentions_task_and_target() {
        let generator = CommandGenerator::from_config(&config(&["cat"]), 1024, |_| None)
            .expect("generator");
        let prompt = generator
            .render_prompt("add a greeting", std::path::Path::new("src/hello.txt"))
            .expect("render");
        assert!(prompt.starts_with("Implement this task in 'src/hello.txt': add a greeting"));
    }

    #[test]
    fn bad_template_is_rejected_at_construction() {
        let mut cfg = config(&["cat"]);
        cfg.prompt_template = "{{ task ".to_string();
        assert!(CommandGenerator::from_config(&cfg, 1024, |_| None).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn stdout_becomes_content() {
        let temp = tempfile::tempdir().expect("tempdir");
        let generator =
            CommandGenerator::from_config(&config(&["sh", "-c", "printf 'fn main() {}\\n'"]), 1024, |_| None)
                .expect("generator");
        let content = generator.generate(&request(temp.path())).expect("generate");
        assert_eq!(content, "fn main() {}\n");
    }

    #[cfg(unix)]
    #[test]
    fn captured_env_is_passed_to_child() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut cfg = config(&["sh", "-c", "printf %s \"$REWIND_TEST_TOKEN\""]);
        cfg.required_env = vec!["REWIND_TEST_TOKEN".to_string()];
        let generator = CommandGenerator::from_config(&cfg, 1024, |_| Some("s3cret".to_string()))
            .expect("generator");
        assert_eq!(generator.generate(&request(temp.path())).expect("generate"), "s3cret");
    }

    #[cfg(unix)]
    #[test]
    fn nonzero_exit_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let generator = CommandGenerator::from_config(
            &config(&["sh", "-c", "echo quota exceeded >&2; exit 7"]),
            1024,
            |_| None,
        )
        .expect("generator");
        let err = generator.generate(&request(temp.path())).unwrap_err();
        assert!(err.to_string().contains("quota exceeded"));
    }

    #[cfg(unix)]
    #[test]
    fn truncated_output_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let generator =
            CommandGenerator::from_config(&config(&["sh", "-c", "printf 0123456789"]), 4, |_| None)
                .expect("generator");
        let err = generator.generate(&request(temp.path())).unwrap_err();
        assert!(err.to_string().contains("exceeded 4 bytes"));
    }
}
