//! Shared deterministic types for the mutation workflow.
//!
//! These types define the contracts between the guard, the applicator, the
//! verifier and the rollback controller. They carry no I/O handles.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

/// Verifier classification of an applied change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "lowercase")]
pub enum Verdict {
    Pass,
    Fail { reason: String },
}

impl Verdict {
    pub fn fail(reason: impl Into<String>) -> Self {
        Verdict::Fail {
            reason: reason.into(),
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass)
    }
}

/// Stash created by the guard to preserve uncommitted work.
///
/// The workflow never applies or drops it; restoring is left to the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StashRecord {
    /// Message the stash was pushed with (unique per attempt).
    pub label: String,
    /// Commit id of the stash entry, stable even if newer stashes are pushed.
    pub commit: String,
}

impl StashRecord {
    /// Command the operator can run to bring the stashed work back.
    pub fn restore_hint(&self) -> String {
        format!("git stash apply {}", self.commit)
    }
}

/// Content the target path is restored to on rollback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Baseline {
    /// The path is committed at HEAD with these bytes.
    Committed(Vec<u8>),
    /// Not committed, but present on disk (e.g. an ignored file); rollback rewrites it.
    Ignored(Vec<u8>),
    /// No prior version; rollback deletes the path.
    Absent,
}

impl Baseline {
    pub fn describe(&self) -> &'static str {
        match self {
            Baseline::Committed(_) => "committed",
            Baseline::Ignored(_) => "ignored",
            Baseline::Absent => "absent",
        }
    }
}

/// What the applicator changed on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedChange {
    /// Absolute path that was replaced.
    pub path: PathBuf,
    /// Directories created for the write, outermost first.
    pub created_dirs: Vec<PathBuf>,
    /// Number of bytes written.
    pub bytes: usize,
}

/// Terminal result of a mutation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// Verification passed; the generated content stays.
    Done,
    /// Verification failed or was abandoned; the target is back at its baseline.
    RolledBack,
    /// Nothing was written (generation or apply failed).
    Failed,
}

impl AttemptOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            AttemptOutcome::Done => "done",
            AttemptOutcome::RolledBack => "rolled_back",
            AttemptOutcome::Failed => "failed",
        }
    }
}

/// Stable classification of workflow errors, used in records and exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Configuration,
    DirtyTreeDeclined,
    Busy,
    Generation,
    Apply,
    Verification,
    Cancelled,
    Rollback,
}

/// A recoverable failure attached to a non-`Done` attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub kind: FailureKind,
    pub reason: String,
}

impl Failure {
    pub fn new(kind: FailureKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }
}

/// Shared flag the operator side sets to abandon an attempt.
///
/// The controller checks it at each phase boundary and child processes are
/// killed when it trips. A cancelled attempt that already wrote the target is
/// rolled back.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
