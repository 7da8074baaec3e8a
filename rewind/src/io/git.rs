//! Git adapter for the mutation workflow.
//!
//! The guard and the rollback controller only need a handful of repository
//! operations, so they program against the narrow [`VersionControl`] trait.
//! [`Git`] implements it with explicit `git` subprocess calls in a fixed
//! working directory; tests substitute an in-memory fake.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::core::target::git_path;
use crate::core::types::StashRecord;

/// Parsed `git status --porcelain` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusEntry {
    /// 2-letter XY code, or "??" for untracked.
    pub code: String,
    /// Path for the changed file.
    pub path: String,
}

/// Repository operations the workflow depends on.
///
/// Paths passed in are relative to the working-tree root the implementation
/// was created for.
pub trait VersionControl {
    /// Uncommitted changes (untracked files included), optionally limited to one path.
    fn status(&self, pathspec: Option<&Path>) -> Result<Vec<StatusEntry>>;

    /// Stash all uncommitted changes, untracked files included.
    ///
    /// Returns `None` when git had nothing to stash.
    fn stash_push(&self, label: &str) -> Result<Option<StashRecord>>;

    /// Bytes of `path` at HEAD, or `None` if HEAD is unborn or the path is not committed.
    fn committed_content(&self, path: &Path) -> Result<Option<Vec<u8>>>;

    /// Restore `path` in the index and working tree to its HEAD content.
    fn restore_path(&self, path: &Path) -> Result<()>;

    /// Directory for workflow bookkeeping (lock file, attempt records).
    ///
    /// Lives outside the working tree so it never shows up as a change.
    fn state_dir(&self) -> Result<PathBuf>;

    /// Stashes whose message starts with `prefix`, newest first.
    fn list_stashes(&self, prefix: &str) -> Result<Vec<StashRecord>>;
}

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Fail unless `workdir` is inside a git working tree.
    #[instrument(skip_all)]
    pub fn ensure_repository(&self) -> Result<()> {
        let out = self
            .run_capture(&["rev-parse", "--is-inside-work-tree"])
            .with_context(|| format!("{} is not a git repository", self.workdir.display()))?;
        if out.trim() != "true" {
            return Err(anyhow!(
                "{} is not inside a git working tree",
                self.workdir.display()
            ));
        }
        Ok(())
    }

    /// Absolute path of the repository's git directory.
    pub fn git_dir(&self) -> Result<PathBuf> {
        let out = self.run_capture(&["rev-parse", "--absolute-git-dir"])?;
        Ok(PathBuf::from(out.trim()))
    }

    fn stash_head(&self) -> Result<Option<String>> {
        let out = self.run(&["rev-parse", "--verify", "--quiet", "refs/stash"])?;
        if !out.status.success() {
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&out.stdout).trim().to_string()))
    }

    fn head_exists(&self) -> Result<bool> {
        let out = self.run(&["rev-parse", "--verify", "--quiet", "HEAD"])?;
        Ok(out.status.success())
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run_checked(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}

impl VersionControl for Git {
    #[instrument(skip_all, fields(pathspec = ?pathspec))]
    fn status(&self, pathspec: Option<&Path>) -> Result<Vec<StatusEntry>> {
        let mut args = vec!["status", "--porcelain=v1", "-uall"];
        let spec;
        if let Some(path) = pathspec {
            spec = git_path(path);
            args.push("--");
            args.push(&spec);
        }
        let out = self.run_capture(&args)?;
        let mut entries = Vec::new();
        for line in out.lines() {
            if line.trim().is_empty() {
                continue;
            }
            entries.push(parse_status_line(line)?);
        }
        debug!(entries = entries.len(), "status collected");
        Ok(entries)
    }

    #[instrument(skip_all, fields(label))]
    fn stash_push(&self, label: &str) -> Result<Option<StashRecord>> {
        let before = self.stash_head()?;
        self.run_checked(&["stash", "push", "--include-untracked", "-m", label])?;
        let after = self.stash_head()?;
        match after {
            Some(commit) if after != before => {
                debug!(commit = %commit, "stash created");
                Ok(Some(StashRecord {
                    label: label.to_string(),
                    commit,
                }))
            }
            _ => {
                warn!("git stash push created no stash entry");
                Ok(None)
            }
        }
    }

    #[instrument(skip_all, fields(path = %path.display()))]
    fn committed_content(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        if !self.head_exists()? {
            debug!("HEAD is unborn, no committed content");
            return Ok(None);
        }
        let spec = format!("HEAD:./{}", git_path(path));
        let kind = self.run(&["cat-file", "-t", &spec])?;
        if !kind.status.success() {
            debug!("path not present at HEAD");
            return Ok(None);
        }
        let kind = String::from_utf8_lossy(&kind.stdout).trim().to_string();
        if kind != "blob" {
            return Err(anyhow!(
                "{} is a {kind} at HEAD, expected a file",
                path.display()
            ));
        }
        let blob = self.run_checked(&["cat-file", "blob", &spec])?;
        Ok(Some(blob.stdout))
    }

    #[instrument(skip_all, fields(path = %path.display()))]
    fn restore_path(&self, path: &Path) -> Result<()> {
        let spec = git_path(path);
        self.run_checked(&["checkout", "HEAD", "--", &spec])?;
        Ok(())
    }

    fn state_dir(&self) -> Result<PathBuf> {
        Ok(self.git_dir()?.join("rewind"))
    }

    fn list_stashes(&self, prefix: &str) -> Result<Vec<StashRecord>> {
        if self.stash_head()?.is_none() {
            return Ok(Vec::new());
        }
        let out = self.run_capture(&["stash", "list", "--format=%H%x09%gs"])?;
        let mut records = Vec::new();
        for line in out.lines() {
            if let Some(record) = parse_stash_line(line, prefix) {
                records.push(record);
            }
        }
        Ok(records)
    }
}

fn parse_status_line(line: &str) -> Result<StatusEntry> {
    if let Some(path) = line.strip_prefix("?? ") {
        return Ok(StatusEntry {
            code: "??".to_string(),
            path: path.trim().to_string(),
        });
    }
    if line.len() < 4 {
        return Err(anyhow!("unexpected porcelain line: '{line}'"));
    }
    let code = line[..2].to_string();
    let mut path = line[3..].trim().to_string();
    if let Some((_, new)) = path.split_once("->") {
        path = new.trim().to_string();
    }
    Ok(StatusEntry { code, path })
}

/// Parse `<sha>\t<reflog subject>`; the subject reads `On <branch>: <message>`.
fn parse_stash_line(line: &str, prefix: &str) -> Option<StashRecord> {
    let (commit, subject) = line.split_once('\t')?;
    let message = subject
        .split_once(": ")
        .map(|(_, msg)| msg)
        .unwrap_or(subject);
    if !message.starts_with(prefix) {
        return None;
    }
    Some(StashRecord {
        label: message.to_string(),
        commit: commit.trim().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_untracked_line() {
        let e = parse_status_line("?? foo.txt").expect("parse");
        assert_eq!(
            e,
            StatusEntry {
                code: "??".to_string(),
                path: "foo.txt".to_string()
            }
        );
    }

    #[test]
    fn parses_modified_line() {
        let e = parse_status_line(" M src/main.rs").expect("parse");
        assert_eq!(e.code, " M");
        assert_eq!(e.path, "src/main.rs");
    }

    #[test]
    fn parses_rename_line_uses_new_path() {
        let e = parse_status_line("R  old.txt -> new.txt").expect("parse");
        assert_eq!(e.path, "new.txt");
    }

    #[test]
    fn stash_line_matches_prefix() {
        let record = parse_stash_line(
            "0123abcd\tOn main: rewind: 20260101-000000-1 before src/a.rs",
            "rewind:",
        )
        .expect("record");
        assert_eq!(record.commit, "0123abcd");
        assert_eq!(record.label, "rewind: 20260101-000000-1 before src/a.rs");
    }

    #[test]
    fn stash_line_ignores_foreign_stashes() {
        assert!(parse_stash_line("0123abcd\tWIP on main: 1234 msg", "rewind:").is_none());
    }
}
