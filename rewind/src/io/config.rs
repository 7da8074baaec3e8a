//! Workflow configuration stored in `rewind.toml` at the working-tree root.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// File name looked up under the working-tree root when `--config` is not given.
pub const CONFIG_FILE_NAME: &str = "rewind.toml";

/// Default instruction handed to the generator; `task` and `target` are filled in.
pub const DEFAULT_PROMPT_TEMPLATE: &str = "\
Implement this task in '{{ target }}': {{ task }}

Output ONLY the complete contents of the file. Do not include markdown blocks.
";

/// What to do when the working tree has uncommitted changes at start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DirtyPolicy {
    /// Ask the operator; yes stashes, no aborts.
    Prompt,
    /// Stash everything (untracked included) without asking.
    Stash,
    /// Refuse to run.
    Abort,
    /// Leave unrelated changes in place; still refuses if the target itself is dirty.
    Proceed,
}

/// How to react when another attempt holds the work-tree lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LockMode {
    /// Reject the second attempt immediately.
    Fail,
    /// Block until the lock is released.
    Wait,
}

/// Workflow configuration (TOML).
///
/// Missing fields take the defaults below; CLI flags override file values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RewindConfig {
    pub dirty_tree: DirtyPolicy,

    pub lock: LockMode,

    /// Remove directories the applicator created when rolling back a new file.
    pub remove_created_dirs: bool,

    /// Truncate generator/verifier output beyond this many bytes.
    pub output_limit_bytes: usize,

    pub generator: GeneratorConfig,

    pub verifier: VerifierConfig,
}

/// Settings for the external change generator.
///
/// Environment variables are read once, when the generator is constructed from
/// this config, never ad hoc during an attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Command to execute; the rendered prompt is written to its stdin.
    pub command: Vec<String>,

    /// minijinja template for the prompt (`task`, `target` are available).
    pub prompt_template: String,

    /// Environment variables that must be set (e.g. API keys).
    pub required_env: Vec<String>,

    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct VerifierConfig {
    /// Command to run after the write (e.g. `["pnpm","build"]`).
    ///
    /// Empty means the built-in check: the target exists and is non-empty.
    pub command: Vec<String>,

    pub timeout_secs: u64,
}

impl Default for RewindConfig {
    fn default() -> Self {
        Self {
            dirty_tree: DirtyPolicy::Prompt,
            lock: LockMode::Fail,
            remove_created_dirs: true,
            output_limit_bytes: 1_000_000,
            generator: GeneratorConfig::default(),
            verifier: VerifierConfig::default(),
        }
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            command: vec!["claude".to_string(), "-p".to_string()],
            prompt_template: DEFAULT_PROMPT_TEMPLATE.to_string(),
            required_env: vec!["ANTHROPIC_API_KEY".to_string()],
            timeout_secs: 5 * 60,
        }
    }
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            timeout_secs: 30 * 60,
        }
    }
}

impl GeneratorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl VerifierConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl RewindConfig {
    pub fn validate(&self) -> Result<()> {
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.generator.command.is_empty() || self.generator.command[0].trim().is_empty() {
            return Err(anyhow!("generator.command must be a non-empty array"));
        }
        if self.generator.prompt_template.trim().is_empty() {
            return Err(anyhow!("generator.prompt_template must not be empty"));
        }
        if self.generator.timeout_secs == 0 {
            return Err(anyhow!("generator.timeout_secs must be > 0"));
        }
        if self
            .generator
            .required_env
            .iter()
            .any(|name| name.trim().is_empty())
        {
            return Err(anyhow!("generator.required_env entries must be non-empty"));
        }
        if let Some(first) = self.verifier.command.first()
            && first.trim().is_empty()
        {
            return Err(anyhow!("verifier.command[0] must be non-empty"));
        }
        if self.verifier.timeout_secs == 0 {
            return Err(anyhow!("verifier.timeout_secs must be > 0"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `RewindConfig::default()`.
pub fn load_config(path: &Path) -> Result<RewindConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "config missing, using defaults");
        let cfg = RewindConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: RewindConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &RewindConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, buf).with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, RewindConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(CONFIG_FILE_NAME);
        let mut cfg = RewindConfig::default();
        cfg.dirty_tree = DirtyPolicy::Stash;
        cfg.verifier.command = vec!["pnpm".to_string(), "build".to_string()];
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(CONFIG_FILE_NAME);
        fs::write(
            &path,
            "dirty_tree = \"abort\"\n\n[verifier]\ncommand = [\"just\", \"ci\"]\n",
        )
        .expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.dirty_tree, DirtyPolicy::Abort);
        assert_eq!(cfg.lock, LockMode::Fail);
        assert_eq!(cfg.verifier.command, vec!["just", "ci"]);
        assert_eq!(cfg.verifier.timeout_secs, 30 * 60);
        assert_eq!(cfg.generator, GeneratorConfig::default());
    }

    #[test]
    fn rejects_zero_timeouts() {
        let mut cfg = RewindConfig::default();
        cfg.generator.timeout_secs = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = RewindConfig::default();
        cfg.verifier.timeout_secs = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_empty_generator_command() {
        let mut cfg = RewindConfig::default();
        cfg.generator.command.clear();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("generator.command"));
    }
}
