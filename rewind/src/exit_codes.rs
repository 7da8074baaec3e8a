//! Stable exit codes for rewind CLI commands.

use crate::core::types::{AttemptOutcome, FailureKind};

/// Attempt finished DONE, or a read-only command succeeded.
pub const OK: i32 = 0;
/// No attempt was made: bad config or target, dirty tree declined, or busy.
pub const INVALID: i32 = 1;
/// Verification failed and the target was restored to its baseline.
pub const ROLLED_BACK: i32 = 2;
/// Generation or apply failed; the target was never modified.
pub const FAILED: i32 = 3;
/// Rollback failed; the working tree needs manual attention.
pub const ROLLBACK_FAILED: i32 = 4;

pub fn for_outcome(outcome: AttemptOutcome) -> i32 {
    match outcome {
        AttemptOutcome::Done => OK,
        AttemptOutcome::RolledBack => ROLLED_BACK,
        AttemptOutcome::Failed => FAILED,
    }
}

pub fn for_failure(kind: FailureKind) -> i32 {
    match kind {
        FailureKind::Configuration | FailureKind::DirtyTreeDeclined | FailureKind::Busy => {
            INVALID
        }
        FailureKind::Generation | FailureKind::Apply | FailureKind::Cancelled => FAILED,
        FailureKind::Verification => ROLLED_BACK,
        FailureKind::Rollback => ROLLBACK_FAILED,
    }
}
