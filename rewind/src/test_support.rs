//! Test-only doubles for the workflow's seams and a throwaway git repository.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, anyhow, bail};
use tempfile::TempDir;

use crate::core::target::git_path;
use crate::core::types::{CancelFlag, StashRecord, Verdict};
use crate::guard::Operator;
use crate::io::generator::{GenerateRequest, Generator};
use crate::io::git::{Git, StatusEntry, VersionControl};
use crate::io::verifier::{Verifier, VerifyRequest};

/// In-memory [`VersionControl`].
///
/// Status is whatever the test sets with [`FakeVcs::set_dirty`]. With a root,
/// committed files are also written to disk so checkout restores real bytes.
#[derive(Debug, Default)]
pub struct FakeVcs {
    root: Option<PathBuf>,
    committed: RefCell<BTreeMap<String, Vec<u8>>>,
    dirty: RefCell<Vec<String>>,
    stashes: RefCell<Vec<StashRecord>>,
    restored: RefCell<Vec<PathBuf>>,
    status_error: RefCell<Option<String>>,
    restore_error: RefCell<Option<String>>,
}

impl FakeVcs {
    pub fn with_root(root: &Path) -> Self {
        Self {
            root: Some(root.to_path_buf()),
            ..Self::default()
        }
    }

    /// Record `bytes` as the HEAD content of `path` (and write it under the root).
    pub fn commit_file(&self, path: &str, bytes: &[u8]) {
        if let Some(root) = &self.root {
            let full = root.join(path);
            if let Some(parent) = full.parent() {
                fs::create_dir_all(parent).expect("create parent");
            }
            fs::write(&full, bytes).expect("write committed file");
        }
        self.committed
            .borrow_mut()
            .insert(path.to_string(), bytes.to_vec());
    }

    pub fn set_dirty(&self, paths: &[&str]) {
        *self.dirty.borrow_mut() = paths.iter().map(|p| p.to_string()).collect();
    }

    pub fn fail_status(&self, message: &str) {
        *self.status_error.borrow_mut() = Some(message.to_string());
    }

    pub fn fail_restore(&self, message: &str) {
        *self.restore_error.borrow_mut() = Some(message.to_string());
    }

    pub fn stash_count(&self) -> usize {
        self.stashes.borrow().len()
    }

    pub fn restored_paths(&self) -> Vec<PathBuf> {
        self.restored.borrow().clone()
    }
}

impl VersionControl for FakeVcs {
    fn status(&self, pathspec: Option<&Path>) -> Result<Vec<StatusEntry>> {
        if let Some(message) = self.status_error.borrow().as_ref() {
            bail!("{message}");
        }
        let wanted = pathspec.map(git_path);
        Ok(self
            .dirty
            .borrow()
            .iter()
            .filter(|path| wanted.as_ref().is_none_or(|w| w == *path))
            .map(|path| StatusEntry {
                code: " M".to_string(),
                path: path.clone(),
            })
            .collect())
    }

    fn stash_push(&self, label: &str) -> Result<Option<StashRecord>> {
        if self.dirty.borrow().is_empty() {
            return Ok(None);
        }
        self.dirty.borrow_mut().clear();
        let mut stashes = self.stashes.borrow_mut();
        let record = StashRecord {
            label: label.to_string(),
            commit: format!("fakestash{}", stashes.len()),
        };
        stashes.insert(0, record.clone());
        Ok(Some(record))
    }

    fn committed_content(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        Ok(self.committed.borrow().get(&git_path(path)).cloned())
    }

    fn restore_path(&self, path: &Path) -> Result<()> {
        if let Some(message) = self.restore_error.borrow().as_ref() {
            bail!("{message}");
        }
        let bytes = self
            .committed
            .borrow()
            .get(&git_path(path))
            .cloned()
            .ok_or_else(|| anyhow!("pathspec '{}' did not match", path.display()))?;
        if let Some(root) = &self.root {
            fs::write(root.join(path), bytes)?;
        }
        self.restored.borrow_mut().push(path.to_path_buf());
        Ok(())
    }

    fn state_dir(&self) -> Result<PathBuf> {
        self.root
            .as_ref()
            .map(|root| root.join(".git").join("rewind"))
            .ok_or_else(|| anyhow!("fake repository has no root"))
    }

    fn list_stashes(&self, prefix: &str) -> Result<Vec<StashRecord>> {
        Ok(self
            .stashes
            .borrow()
            .iter()
            .filter(|s| s.label.starts_with(prefix))
            .cloned()
            .collect())
    }
}

/// Operator with a fixed answer to the stash prompt; records every message.
#[derive(Debug, Default)]
pub struct ScriptedOperator {
    answer: bool,
    confirmations: Cell<usize>,
    messages: RefCell<Vec<String>>,
}

impl ScriptedOperator {
    pub fn answering(answer: bool) -> Self {
        Self {
            answer,
            ..Self::default()
        }
    }

    pub fn confirmations(&self) -> usize {
        self.confirmations.get()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.borrow().clone()
    }
}

impl Operator for ScriptedOperator {
    fn confirm_stash(&self, _entries: &[StatusEntry]) -> Result<bool> {
        self.confirmations.set(self.confirmations.get() + 1);
        Ok(self.answer)
    }

    fn notify(&self, message: &str) {
        self.messages.borrow_mut().push(message.to_string());
    }
}

/// Scripted collaborator reply.
#[derive(Debug, Clone)]
enum Reply<T> {
    Value(T),
    Error(String),
    Panic(String),
}

impl<T: Clone> Reply<T> {
    fn resolve(&self) -> Result<T> {
        match self {
            Reply::Value(value) => Ok(value.clone()),
            Reply::Error(message) => Err(anyhow!("{message}")),
            Reply::Panic(message) => panic!("{message}"),
        }
    }
}

/// Generator with a fixed reply; counts calls.
#[derive(Debug)]
pub struct ScriptedGenerator {
    reply: Reply<String>,
    calls: Cell<usize>,
    cancel_on_call: Option<CancelFlag>,
}

impl ScriptedGenerator {
    fn single(reply: Reply<String>) -> Self {
        Self {
            reply,
            calls: Cell::new(0),
            cancel_on_call: None,
        }
    }

    pub fn returning(content: &str) -> Self {
        Self::single(Reply::Value(content.to_string()))
    }

    pub fn failing(message: &str) -> Self {
        Self::single(Reply::Error(message.to_string()))
    }

    pub fn panicking(message: &str) -> Self {
        Self::single(Reply::Panic(message.to_string()))
    }

    /// Trip `flag` while generating, as an operator interrupt would.
    pub fn cancelling(mut self, flag: CancelFlag) -> Self {
        self.cancel_on_call = Some(flag);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl Generator for ScriptedGenerator {
    fn generate(&self, _request: &GenerateRequest) -> Result<String> {
        self.calls.set(self.calls.get() + 1);
        if let Some(flag) = &self.cancel_on_call {
            flag.cancel();
        }
        self.reply.resolve()
    }
}

/// Verifier with a fixed reply; counts calls.
#[derive(Debug)]
pub struct ScriptedVerifier {
    reply: Reply<Verdict>,
    calls: Cell<usize>,
    cancel_on_call: Option<CancelFlag>,
}

impl ScriptedVerifier {
    fn with(reply: Reply<Verdict>) -> Self {
        Self {
            reply,
            calls: Cell::new(0),
            cancel_on_call: None,
        }
    }

    pub fn passing() -> Self {
        Self::with(Reply::Value(Verdict::Pass))
    }

    pub fn failing(reason: &str) -> Self {
        Self::with(Reply::Value(Verdict::fail(reason)))
    }

    pub fn erroring(message: &str) -> Self {
        Self::with(Reply::Error(message.to_string()))
    }

    pub fn panicking(message: &str) -> Self {
        Self::with(Reply::Panic(message.to_string()))
    }

    /// Trip `flag` while verifying, then still return the scripted verdict.
    pub fn cancelling(mut self, flag: CancelFlag) -> Self {
        self.cancel_on_call = Some(flag);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl Verifier for ScriptedVerifier {
    fn verify(&self, _request: &VerifyRequest) -> Result<Verdict> {
        self.calls.set(self.calls.get() + 1);
        if let Some(flag) = &self.cancel_on_call {
            flag.cancel();
        }
        self.reply.resolve()
    }
}

/// Real git repository in a temp directory with one initial commit.
pub struct TestRepo {
    dir: TempDir,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("create temp repo dir")?;
        let root = dir.path();
        run_git(root, &["init", "--quiet"])?;
        run_git(root, &["config", "user.name", "Rewind Test"])?;
        run_git(root, &["config", "user.email", "rewind-test@local.invalid"])?;
        run_git(root, &["config", "commit.gpgsign", "false"])?;
        let repo = Self { dir };
        repo.write(".gitignore", "*.local\n")?;
        repo.write("README.md", "# fixture\n")?;
        repo.commit("chore: initial commit")?;
        Ok(repo)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn git(&self) -> Git {
        Git::new(self.path())
    }

    pub fn write(&self, rel: &str, contents: &str) -> Result<()> {
        let path = self.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))
    }

    pub fn read(&self, rel: &str) -> Result<String> {
        let path = self.path().join(rel);
        fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))
    }

    /// Stage everything and commit; returns false when there was nothing to commit.
    pub fn commit(&self, message: &str) -> Result<bool> {
        run_git(self.path(), &["add", "-A"])?;
        if run_git(self.path(), &["diff", "--cached", "--name-only"])?.trim().is_empty() {
            return Ok(false);
        }
        run_git(self.path(), &["commit", "-q", "-m", message])?;
        Ok(true)
    }

    /// `git status --porcelain` output, for whole-tree comparisons.
    pub fn porcelain(&self) -> Result<String> {
        run_git(self.path(), &["status", "--porcelain=v1", "-uall"])
    }

    pub fn stash_list(&self) -> Result<Vec<String>> {
        let out = run_git(self.path(), &["stash", "list", "--format=%gs"])?;
        Ok(out.lines().map(str::to_string).collect())
    }
}

fn run_git(root: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(root)
        .output()
        .with_context(|| format!("run git {args:?}"))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("git {args:?} failed: {}", stderr.trim());
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}
