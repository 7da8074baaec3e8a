//! Repository state guard.
//!
//! Runs before anything else in an attempt. It is the only step allowed to
//! change state outside the target path: when the tree is dirty and the policy
//! says so, it pushes exactly one stash. That stash is never popped by the
//! workflow; the operator is told its name and restores it themselves.

use std::io::{BufRead, Write};
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::core::target::git_path;
use crate::core::types::StashRecord;
use crate::error::MutationError;
use crate::io::config::DirtyPolicy;
use crate::io::git::{StatusEntry, VersionControl};

/// Prefix of every stash message the workflow creates.
pub const STASH_PREFIX: &str = "rewind:";

/// The person (or script) driving the workflow.
pub trait Operator {
    /// Ask whether uncommitted changes may be stashed. `false` aborts the attempt.
    fn confirm_stash(&self, entries: &[StatusEntry]) -> Result<bool>;

    /// Show a progress or outcome message.
    fn notify(&self, message: &str);
}

/// Operator on a terminal: confirmation read from stdin, messages on stdout
/// (or stderr when stdout carries machine-readable output).
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalOperator {
    to_stderr: bool,
}

impl TerminalOperator {
    pub fn stdout() -> Self {
        Self { to_stderr: false }
    }

    pub fn stderr() -> Self {
        Self { to_stderr: true }
    }

    fn writer(&self) -> Box<dyn Write> {
        if self.to_stderr {
            Box::new(std::io::stderr())
        } else {
            Box::new(std::io::stdout())
        }
    }
}

impl Operator for TerminalOperator {
    fn confirm_stash(&self, entries: &[StatusEntry]) -> Result<bool> {
        let mut out = self.writer();
        writeln!(out, "WARNING: working tree has uncommitted changes:")?;
        for entry in entries.iter().take(20) {
            writeln!(out, "  {} {}", entry.code, entry.path)?;
        }
        if entries.len() > 20 {
            writeln!(out, "  ... and {} more", entries.len() - 20)?;
        }
        write!(out, "Stash them (including untracked files) and continue? [y/N]: ")?;
        out.flush()?;

        let mut answer = String::new();
        std::io::stdin()
            .lock()
            .read_line(&mut answer)
            .context("read confirmation from stdin")?;
        Ok(matches!(answer.trim(), "y" | "Y" | "yes" | "YES"))
    }

    fn notify(&self, message: &str) {
        let mut out = self.writer();
        let _ = writeln!(out, "{message}");
    }
}

/// What the guard found and did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardReport {
    pub was_clean: bool,
    pub dirty_entries: usize,
    pub stash: Option<StashRecord>,
}

/// True when there are no uncommitted changes, untracked files included.
pub fn check_clean<V: VersionControl>(vcs: &V) -> Result<bool> {
    Ok(vcs.status(None)?.is_empty())
}

/// Unique stash message for one attempt.
pub fn stash_label(attempt_id: &str, target: &Path) -> String {
    format!("{STASH_PREFIX} {attempt_id} before {}", git_path(target))
}

/// Inspect the tree and, if it is dirty, apply `policy`.
///
/// Creates at most one stash. Git failures are configuration errors: the
/// attempt must not start without knowing the tree's state.
#[instrument(skip_all, fields(target = %target.display(), policy = ?policy))]
pub fn preserve_if_dirty<V: VersionControl>(
    vcs: &V,
    target: &Path,
    policy: DirtyPolicy,
    operator: &dyn Operator,
    label: &str,
) -> Result<GuardReport, MutationError> {
    let entries = vcs
        .status(None)
        .context("inspect working tree")
        .map_err(MutationError::Configuration)?;

    if entries.is_empty() {
        info!("working tree is clean");
        operator.notify("Working tree is clean.");
        return Ok(GuardReport {
            was_clean: true,
            dirty_entries: 0,
            stash: None,
        });
    }

    let count = entries.len();
    warn!(dirty_entries = count, "working tree not clean");

    let policy = match policy {
        DirtyPolicy::Prompt => {
            let accepted = operator.confirm_stash(&entries).map_err(|err| {
                MutationError::DirtyTreeDeclined {
                    reason: format!("could not confirm stashing: {err:#}"),
                }
            })?;
            if accepted {
                DirtyPolicy::Stash
            } else {
                DirtyPolicy::Abort
            }
        }
        other => other,
    };

    match policy {
        DirtyPolicy::Abort | DirtyPolicy::Prompt => Err(MutationError::DirtyTreeDeclined {
            reason: format!("working tree has {count} uncommitted change(s); nothing was modified"),
        }),
        DirtyPolicy::Proceed => {
            let own = vcs
                .status(Some(target))
                .context("inspect target status")
                .map_err(MutationError::Configuration)?;
            if !own.is_empty() {
                return Err(MutationError::DirtyTreeDeclined {
                    reason: format!(
                        "{} has uncommitted changes that a rollback would discard; commit or stash them first",
                        target.display()
                    ),
                });
            }
            debug!("leaving unrelated changes in place");
            operator.notify(&format!(
                "Proceeding with {count} uncommitted change(s) left in place; only {} will be touched.",
                target.display()
            ));
            Ok(GuardReport {
                was_clean: false,
                dirty_entries: count,
                stash: None,
            })
        }
        DirtyPolicy::Stash => {
            let stash = vcs
                .stash_push(label)
                .context("stash uncommitted changes")
                .map_err(MutationError::Configuration)?
                .ok_or_else(|| MutationError::DirtyTreeDeclined {
                    reason: "git stash created no entry; uncommitted changes could not be preserved"
                        .to_string(),
                })?;
            info!(label = %stash.label, commit = %stash.commit, "stashed uncommitted changes");
            operator.notify(&format!(
                "Stashed {count} uncommitted change(s) as '{}' ({}).",
                stash.label, stash.commit
            ));

            match vcs.status(None) {
                Ok(rest) if !rest.is_empty() => {
                    warn!(remaining = rest.len(), "changes remain after stash");
                }
                Ok(_) => {}
                Err(err) => warn!(err = %err, "could not re-check status after stash"),
            }

            Ok(GuardReport {
                was_clean: false,
                dirty_entries: count,
                stash: Some(stash),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::FailureKind;
    use crate::test_support::{FakeVcs, ScriptedOperator};

    const TARGET: &str = "src/app.tsx";

    fn run(vcs: &FakeVcs, policy: DirtyPolicy, operator: &ScriptedOperator) -> Result<GuardReport, MutationError> {
        preserve_if_dirty(vcs, Path::new(TARGET), policy, operator, "rewind: t before src/app.tsx")
    }

    #[test]
    fn clean_tree_is_left_alone() {
        let vcs = FakeVcs::default();
        let operator = ScriptedOperator::answering(false);
        let report = run(&vcs, DirtyPolicy::Stash, &operator).expect("guard");
        assert!(report.was_clean);
        assert!(report.stash.is_none());
        assert_eq!(vcs.stash_count(), 0);
        assert!(operator.messages().iter().any(|m| m.contains("clean")));
    }

    #[test]
    fn dirty_tree_is_stashed_once() {
        let vcs = FakeVcs::default();
        vcs.set_dirty(&["README.md", "notes.txt"]);
        let operator = ScriptedOperator::answering(false);
        let report = run(&vcs, DirtyPolicy::Stash, &operator).expect("guard");
        let stash = report.stash.expect("stash");
        assert_eq!(stash.label, "rewind: t before src/app.tsx");
        assert_eq!(vcs.stash_count(), 1);
        assert!(check_clean(&vcs).expect("status"));
        assert_eq!(operator.confirmations(), 0);
    }

    #[test]
    fn prompt_yes_stashes_and_no_declines() {
        let vcs = FakeVcs::default();
        vcs.set_dirty(&["README.md"]);
        let yes = ScriptedOperator::answering(true);
        let report = run(&vcs, DirtyPolicy::Prompt, &yes).expect("guard");
        assert!(report.stash.is_some());
        assert_eq!(yes.confirmations(), 1);

        let vcs = FakeVcs::default();
        vcs.set_dirty(&["README.md"]);
        let no = ScriptedOperator::answering(false);
        let err = run(&vcs, DirtyPolicy::Prompt, &no).unwrap_err();
        assert_eq!(err.kind(), FailureKind::DirtyTreeDeclined);
        assert_eq!(vcs.stash_count(), 0);
    }

    #[test]
    fn abort_policy_declines_without_mutation() {
        let vcs = FakeVcs::default();
        vcs.set_dirty(&["README.md"]);
        let err = run(&vcs, DirtyPolicy::Abort, &ScriptedOperator::answering(true)).unwrap_err();
        assert!(matches!(err, MutationError::DirtyTreeDeclined { .. }));
        assert_eq!(vcs.stash_count(), 0);
    }

    #[test]
    fn proceed_refuses_when_target_itself_is_dirty() {
        let vcs = FakeVcs::default();
        vcs.set_dirty(&["README.md", TARGET]);
        let err = run(&vcs, DirtyPolicy::Proceed, &ScriptedOperator::answering(true)).unwrap_err();
        assert!(err.to_string().contains("src/app.tsx"));

        let vcs = FakeVcs::default();
        vcs.set_dirty(&["README.md"]);
        let report = run(&vcs, DirtyPolicy::Proceed, &ScriptedOperator::answering(true))
            .expect("guard");
        assert!(!report.was_clean);
        assert!(report.stash.is_none());
    }

    #[test]
    fn git_failure_is_configuration_error() {
        let vcs = FakeVcs::default();
        vcs.fail_status("not a git repository");
        let err = run(&vcs, DirtyPolicy::Stash, &ScriptedOperator::answering(true)).unwrap_err();
        assert_eq!(err.kind(), FailureKind::Configuration);
    }

    #[test]
    fn label_is_prefixed_and_names_target() {
        let label = stash_label("20260101-000000-42", Path::new("components/x.tsx"));
        assert_eq!(label, "rewind: 20260101-000000-42 before components/x.tsx");
    }
}
