//! Error kinds surfaced at the attempt boundary.
//!
//! Adapters return `anyhow::Result` with context; the attempt controller sorts
//! those failures into [`MutationError`] so callers can tell a recoverable
//! outcome from one that needs the operator.

use std::path::PathBuf;

use crate::core::machine::TransitionError;
use crate::core::types::{Failure, FailureKind, StashRecord};
use crate::io::lock::LockBusy;

#[derive(Debug, thiserror::Error)]
pub enum MutationError {
    /// No repository, unusable config, missing credentials, invalid target.
    #[error("configuration error: {0:#}")]
    Configuration(anyhow::Error),

    /// The tree is dirty and the policy (or the operator) refused to continue.
    #[error("aborted: {reason}")]
    DirtyTreeDeclined { reason: String },

    #[error("{0}")]
    Busy(LockBusy),

    #[error("generation failed: {0}")]
    Generation(String),

    #[error("apply failed: {0}")]
    Apply(String),

    #[error("verification failed: {0}")]
    Verification(String),

    #[error("attempt cancelled: {0}")]
    Cancelled(String),

    /// Restoring the target failed; the tree may be inconsistent.
    #[error(
        "ROLLBACK FAILED for {}: {cause:#}{}",
        .target.display(),
        stash_note(.stash.as_ref())
    )]
    Rollback {
        target: PathBuf,
        stash: Option<StashRecord>,
        cause: anyhow::Error,
    },

    #[error("internal error: {0}")]
    Transition(#[from] TransitionError),
}

fn stash_note(stash: Option<&StashRecord>) -> String {
    match stash {
        Some(record) => format!(
            " (your earlier changes are stashed as '{}', restore with `{}`)",
            record.label,
            record.restore_hint()
        ),
        None => String::new(),
    }
}

impl MutationError {
    pub fn kind(&self) -> FailureKind {
        match self {
            MutationError::Configuration(_) | MutationError::Transition(_) => {
                FailureKind::Configuration
            }
            MutationError::DirtyTreeDeclined { .. } => FailureKind::DirtyTreeDeclined,
            MutationError::Busy(_) => FailureKind::Busy,
            MutationError::Generation(_) => FailureKind::Generation,
            MutationError::Apply(_) => FailureKind::Apply,
            MutationError::Verification(_) => FailureKind::Verification,
            MutationError::Cancelled(_) => FailureKind::Cancelled,
            MutationError::Rollback { .. } => FailureKind::Rollback,
        }
    }

    /// True for errors that leave the tree needing manual attention.
    pub fn is_fatal(&self) -> bool {
        matches!(self, MutationError::Rollback { .. })
    }

    /// Record form for attempt reports.
    pub fn to_failure(&self) -> Failure {
        let reason = match self {
            MutationError::Generation(reason)
            | MutationError::Apply(reason)
            | MutationError::Verification(reason)
            | MutationError::Cancelled(reason) => reason.clone(),
            other => other.to_string(),
        };
        Failure::new(self.kind(), reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn rollback_error_names_target_and_stash() {
        let err = MutationError::Rollback {
            target: PathBuf::from("src/app.tsx"),
            stash: Some(StashRecord {
                label: "rewind: 1 before src/app.tsx".to_string(),
                commit: "abc123".to_string(),
            }),
            cause: anyhow!("git checkout failed"),
        };
        let msg = err.to_string();
        assert!(msg.contains("ROLLBACK FAILED for src/app.tsx"));
        assert!(msg.contains("git checkout failed"));
        assert!(msg.contains("git stash apply abc123"));
        assert!(err.is_fatal());
        assert_eq!(err.kind(), FailureKind::Rollback);
    }

    #[test]
    fn recoverable_failures_keep_bare_reason() {
        let failure = MutationError::Verification("build broke".to_string()).to_failure();
        assert_eq!(failure, Failure::new(FailureKind::Verification, "build broke"));
    }
}
