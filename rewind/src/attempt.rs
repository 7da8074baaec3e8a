//! Orchestration for a single mutation attempt.
//!
//! Guard, generate, apply, verify, and roll back on anything short of a passing
//! verdict. The target path's content when [`run_attempt`] returns is either the
//! verified generated content or its baseline, never a mix. When in doubt
//! (verifier error or panic, cancellation after the write) the attempt rolls
//! back.

use std::fs;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use crate::core::machine::{AttemptEvent, AttemptState, StateTrail, render_states};
use crate::core::target::normalize_target;
pub use crate::core::types::CancelFlag;
use crate::core::types::{AppliedChange, AttemptOutcome, Baseline, Failure, StashRecord, Verdict};
use crate::error::MutationError;
use crate::guard::{Operator, preserve_if_dirty, stash_label};
use crate::io::applicator;
use crate::io::config::{DirtyPolicy, LockMode, RewindConfig};
use crate::io::generator::{GenerateRequest, Generator};
use crate::io::git::VersionControl;
use crate::io::lock::{LockBusy, WorkTreeLock};
use crate::io::record::{attempts_dir, write_record};
use crate::io::verifier::{Verifier, VerifyRequest};
use crate::rollback::restore;

/// Inputs for one attempt.
#[derive(Debug, Clone)]
pub struct AttemptRequest {
    /// Working-tree root. Every path the attempt touches is resolved against it.
    pub root: PathBuf,
    pub task: String,
    /// Target file, relative to `root` or absolute under it.
    pub target: PathBuf,
    pub dirty_policy: DirtyPolicy,
    pub lock_mode: LockMode,
    pub remove_created_dirs: bool,
    pub generator_timeout: Duration,
    pub verifier_timeout: Duration,
    pub output_limit_bytes: usize,
    pub cancel: CancelFlag,
}

impl AttemptRequest {
    pub fn from_config(
        root: impl Into<PathBuf>,
        task: impl Into<String>,
        target: impl Into<PathBuf>,
        config: &RewindConfig,
    ) -> Self {
        Self {
            root: root.into(),
            task: task.into(),
            target: target.into(),
            dirty_policy: config.dirty_tree,
            lock_mode: config.lock,
            remove_created_dirs: config.remove_created_dirs,
            generator_timeout: config.generator.timeout(),
            verifier_timeout: config.verifier.timeout(),
            output_limit_bytes: config.output_limit_bytes,
            cancel: CancelFlag::default(),
        }
    }
}

/// Result of an attempt that reached a terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptReport {
    pub attempt_id: String,
    /// Target relative to the working-tree root.
    pub target: PathBuf,
    pub outcome: AttemptOutcome,
    /// `committed`, `ignored` or `absent`.
    pub baseline: String,
    pub stash: Option<StashRecord>,
    pub failure: Option<Failure>,
    pub bytes_written: Option<usize>,
    pub states: Vec<AttemptState>,
    /// Where the attempt record and verifier log were written.
    pub record_dir: Option<PathBuf>,
}

impl AttemptReport {
    pub fn trail(&self) -> String {
        render_states(&self.states)
    }
}

/// Identifier unique per attempt: local timestamp, process id and a per-process sequence.
pub fn new_attempt_id() -> String {
    static SEQ: AtomicU64 = AtomicU64::new(0);
    format!(
        "{}-{}-{}",
        Local::now().format("%Y%m%d-%H%M%S%.3f"),
        std::process::id(),
        SEQ.fetch_add(1, Ordering::Relaxed)
    )
}

/// Run one mutation attempt end to end.
///
/// Recoverable failures (generation, apply, verification, cancellation) end in
/// an `Ok` report with outcome `Failed` or `RolledBack`. `Err` means no attempt
/// was made (configuration, dirty tree declined, busy) or the rollback itself
/// failed, which needs the operator.
#[instrument(skip_all, fields(target = %request.target.display()))]
pub fn run_attempt<V, G, F>(
    vcs: &V,
    generator: &G,
    verifier: &F,
    operator: &dyn Operator,
    request: &AttemptRequest,
) -> Result<AttemptReport, MutationError>
where
    V: VersionControl,
    G: Generator,
    F: Verifier,
{
    let attempt_id = new_attempt_id();
    let state_dir = vcs
        .state_dir()
        .context("locate repository state directory")
        .map_err(MutationError::Configuration)?;

    let _lock = WorkTreeLock::acquire(&state_dir.join("lock"), request.lock_mode).map_err(
        |err| match err.downcast::<LockBusy>() {
            Ok(busy) => MutationError::Busy(busy),
            Err(err) => MutationError::Configuration(err),
        },
    )?;

    let target = normalize_target(&request.root, &request.target)
        .map_err(|err| MutationError::Configuration(err.into()))?;
    // HEAD does not move during the attempt, so the committed side of the
    // baseline can be read before the guard touches anything.
    let committed = vcs
        .committed_content(&target)
        .with_context(|| format!("read committed content of {}", target.display()))
        .map_err(MutationError::Configuration)?;

    info!(attempt_id = %attempt_id, task = %request.task, "starting mutation attempt");
    operator.notify(&format!(
        "Starting attempt {attempt_id} on {}: {}",
        target.display(),
        request.task.trim()
    ));

    let guard = preserve_if_dirty(
        vcs,
        &target,
        request.dirty_policy,
        operator,
        &stash_label(&attempt_id, &target),
    )?;

    let mut attempt = Attempt {
        id: attempt_id,
        root: &request.root,
        target,
        record_dir: attempts_dir(&state_dir),
        stash: guard.stash,
        trail: StateTrail::default(),
        baseline: Baseline::Absent,
    };
    attempt.record_dir = attempt.record_dir.join(&attempt.id);

    match resolve_baseline(&request.root, &attempt.target, committed) {
        Ok(baseline) => attempt.baseline = baseline,
        Err(err) => {
            // Nothing written yet; end the attempt but keep the stash visible.
            attempt.trail.advance(AttemptEvent::Guarded)?;
            attempt.trail.advance(AttemptEvent::GenerationFailed)?;
            let failure = MutationError::Configuration(err).to_failure();
            return Ok(attempt.finish(operator, Some(failure), None));
        }
    }
    debug!(baseline = attempt.baseline.describe(), "baseline captured");
    attempt.trail.advance(AttemptEvent::Guarded)?;

    if request.cancel.is_cancelled() {
        attempt.trail.advance(AttemptEvent::Cancelled)?;
        let failure = MutationError::Cancelled("cancelled before generation".to_string());
        return Ok(attempt.finish(operator, Some(failure.to_failure()), None));
    }

    let gen_request = GenerateRequest {
        workdir: request.root.clone(),
        task: request.task.clone(),
        target: attempt.target.clone(),
        timeout: request.generator_timeout,
        cancel: request.cancel.clone(),
    };
    let content = match call_guarded("generator", || generator.generate(&gen_request)) {
        Ok(content) if content.trim().is_empty() => {
            Err(MutationError::Generation("generator returned empty content".to_string()))
        }
        Ok(content) => Ok(content),
        Err(err) => Err(MutationError::Generation(format!("{err:#}"))),
    };
    if request.cancel.is_cancelled() {
        attempt.trail.advance(AttemptEvent::Cancelled)?;
        let failure = MutationError::Cancelled("cancelled before write".to_string());
        return Ok(attempt.finish(operator, Some(failure.to_failure()), None));
    }
    let content = match content {
        Ok(content) => content,
        Err(failure) => {
            warn!(%failure, "generation failed, nothing written");
            attempt.trail.advance(AttemptEvent::GenerationFailed)?;
            return Ok(attempt.finish(operator, Some(failure.to_failure()), None));
        }
    };

    let change = match applicator::apply(&request.root, &attempt.target, &content) {
        Ok(change) => change,
        Err(err) => {
            warn!(err = %format!("{err:#}"), "apply failed, target untouched");
            attempt.trail.advance(AttemptEvent::GenerationFailed)?;
            let failure = MutationError::Apply(format!("{err:#}"));
            return Ok(attempt.finish(operator, Some(failure.to_failure()), None));
        }
    };
    attempt.trail.advance(AttemptEvent::Generated)?;
    operator.notify(&format!(
        "Wrote {} bytes to {}.",
        change.bytes,
        attempt.target.display()
    ));

    let failure = if request.cancel.is_cancelled() {
        attempt.trail.advance(AttemptEvent::Cancelled)?;
        MutationError::Cancelled("cancelled before verification".to_string())
    } else {
        operator.notify("Verifying changes...");
        let verify_request = VerifyRequest {
            workdir: request.root.clone(),
            target: attempt.target.clone(),
            timeout: request.verifier_timeout,
            output_limit_bytes: request.output_limit_bytes,
            log_path: Some(attempt.record_dir.join("verify.log")),
            cancel: request.cancel.clone(),
        };
        let verdict = call_guarded("verifier", || verifier.verify(&verify_request));
        match verdict {
            // An interrupted verifier proves nothing, whatever it returned.
            _ if request.cancel.is_cancelled() => {
                attempt.trail.advance(AttemptEvent::Cancelled)?;
                MutationError::Cancelled("cancelled during verification".to_string())
            }
            Ok(Verdict::Pass) => {
                attempt.trail.advance(AttemptEvent::Verified)?;
                info!("verification passed, keeping change");
                return Ok(attempt.finish(operator, None, Some(&change)));
            }
            Ok(Verdict::Fail { reason }) => {
                attempt.trail.advance(AttemptEvent::VerificationFailed)?;
                MutationError::Verification(reason)
            }
            Err(err) => {
                attempt.trail.advance(AttemptEvent::VerificationFailed)?;
                MutationError::Verification(format!("{err:#}"))
            }
        }
    };

    warn!(%failure, "rolling back");
    operator.notify(&format!("{failure}; rolling back {}...", attempt.target.display()));
    if let Err(err) = restore(
        vcs,
        &request.root,
        &attempt.target,
        &attempt.baseline,
        Some(&change),
        request.remove_created_dirs,
    ) {
        error!(err = %format!("{err:#}"), target = %attempt.target.display(), "rollback failed");
        return Err(MutationError::Rollback {
            target: attempt.target,
            stash: attempt.stash,
            cause: err,
        });
    }
    attempt.trail.advance(AttemptEvent::Restored)?;
    Ok(attempt.finish(operator, Some(failure.to_failure()), Some(&change)))
}

/// In-flight attempt bookkeeping.
struct Attempt<'a> {
    id: String,
    root: &'a Path,
    target: PathBuf,
    record_dir: PathBuf,
    stash: Option<StashRecord>,
    trail: StateTrail,
    baseline: Baseline,
}

impl Attempt<'_> {
    /// Build the report for a terminal state, tell the operator, write the record.
    fn finish(
        self,
        operator: &dyn Operator,
        failure: Option<Failure>,
        change: Option<&AppliedChange>,
    ) -> AttemptReport {
        let state = self.trail.current();
        // Callers only finish from a terminal state.
        let outcome = state.outcome().unwrap_or(AttemptOutcome::Failed);

        let mut report = AttemptReport {
            attempt_id: self.id,
            target: self.target,
            outcome,
            baseline: self.baseline.describe().to_string(),
            stash: self.stash,
            failure,
            bytes_written: change.map(|c| c.bytes),
            states: self.trail.states().to_vec(),
            record_dir: Some(self.record_dir.clone()),
        };

        if let Err(err) = write_record(&self.record_dir, &report) {
            warn!(err = %format!("{err:#}"), "failed to write attempt record");
            report.record_dir = None;
        }

        announce(operator, self.root, &report);
        info!(outcome = outcome.as_str(), trail = %report.trail(), "attempt finished");
        report
    }
}

fn announce(operator: &dyn Operator, root: &Path, report: &AttemptReport) {
    let target = report.target.display();
    match report.outcome {
        AttemptOutcome::Done => {
            operator.notify(&format!("SUCCESS: {target} verified and kept."));
        }
        AttemptOutcome::RolledBack => {
            let reason = report
                .failure
                .as_ref()
                .map(|f| f.reason.as_str())
                .unwrap_or("unknown");
            let state = if report.baseline == "absent" {
                "removed again (it had no committed version)"
            } else {
                "back to its last committed content"
            };
            operator.notify(&format!("ROLLED BACK ({reason}): {target} is {state}."));
        }
        AttemptOutcome::Failed => {
            let reason = report
                .failure
                .as_ref()
                .map(|f| f.reason.as_str())
                .unwrap_or("unknown");
            operator.notify(&format!("FAILED ({reason}): {target} was not modified."));
        }
    }
    if let Some(stash) = &report.stash {
        operator.notify(&format!(
            "Note: your earlier changes are stashed as '{}'. Restore them manually with `{}` in {}.",
            stash.label,
            stash.restore_hint(),
            root.display()
        ));
    }
}

/// Complete the baseline once the guard has run: a path without a committed
/// version is either absent or an ignored file whose bytes must be kept.
fn resolve_baseline(root: &Path, target: &Path, committed: Option<Vec<u8>>) -> Result<Baseline> {
    if let Some(bytes) = committed {
        return Ok(Baseline::Committed(bytes));
    }
    let path = root.join(target);
    match fs::read(&path) {
        Ok(bytes) => Ok(Baseline::Ignored(bytes)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Baseline::Absent),
        Err(err) => Err(err).with_context(|| format!("read {}", path.display())),
    }
}

/// Call a collaborator, turning a panic into an error.
fn call_guarded<T>(label: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let msg = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(anyhow!("{label} panicked: {msg}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::FailureKind;
    use crate::test_support::{FakeVcs, ScriptedGenerator, ScriptedOperator, ScriptedVerifier};

    fn request(root: &Path, target: &str) -> AttemptRequest {
        let cfg = RewindConfig {
            dirty_tree: DirtyPolicy::Stash,
            ..RewindConfig::default()
        };
        AttemptRequest::from_config(root, "implement X", target, &cfg)
    }

    #[test]
    fn passing_verdict_keeps_content() {
        let temp = tempfile::tempdir().expect("tempdir");
        let vcs = FakeVcs::with_root(temp.path());
        vcs.commit_file("src/a.rs", b"old");
        let report = run_attempt(
            &vcs,
            &ScriptedGenerator::returning("new"),
            &ScriptedVerifier::passing(),
            &ScriptedOperator::answering(true),
            &request(temp.path(), "src/a.rs"),
        )
        .expect("attempt");

        assert_eq!(report.outcome, AttemptOutcome::Done);
        assert_eq!(report.bytes_written, Some(3));
        assert!(report.stash.is_none());
        assert_eq!(fs::read_to_string(temp.path().join("src/a.rs")).expect("read"), "new");
        assert_eq!(
            report.states,
            vec![
                AttemptState::Start,
                AttemptState::Generating,
                AttemptState::Applied,
                AttemptState::Done
            ]
        );
    }

    #[test]
    fn failing_verdict_restores_committed_bytes() {
        let temp = tempfile::tempdir().expect("tempdir");
        let vcs = FakeVcs::with_root(temp.path());
        vcs.commit_file("src/a.rs", b"old");
        let verifier = ScriptedVerifier::failing("tests red");
        let report = run_attempt(
            &vcs,
            &ScriptedGenerator::returning("new"),
            &verifier,
            &ScriptedOperator::answering(true),
            &request(temp.path(), "src/a.rs"),
        )
        .expect("attempt");

        assert_eq!(report.outcome, AttemptOutcome::RolledBack);
        assert_eq!(
            report.failure,
            Some(Failure::new(FailureKind::Verification, "tests red"))
        );
        assert_eq!(fs::read(temp.path().join("src/a.rs")).expect("read"), b"old");
        assert_eq!(verifier.calls(), 1);
    }

    #[test]
    fn generator_error_writes_nothing() {
        let temp = tempfile::tempdir().expect("tempdir");
        let vcs = FakeVcs::with_root(temp.path());
        vcs.commit_file("src/a.rs", b"old");
        let verifier = ScriptedVerifier::passing();
        let report = run_attempt(
            &vcs,
            &ScriptedGenerator::failing("request timed out"),
            &verifier,
            &ScriptedOperator::answering(true),
            &request(temp.path(), "src/a.rs"),
        )
        .expect("attempt");

        assert_eq!(report.outcome, AttemptOutcome::Failed);
        assert_eq!(report.failure.as_ref().map(|f| f.kind), Some(FailureKind::Generation));
        assert_eq!(fs::read(temp.path().join("src/a.rs")).expect("read"), b"old");
        assert_eq!(verifier.calls(), 0);
        assert!(vcs.restored_paths().is_empty());
    }

    #[test]
    fn empty_content_counts_as_generation_failure() {
        let temp = tempfile::tempdir().expect("tempdir");
        let vcs = FakeVcs::with_root(temp.path());
        let report = run_attempt(
            &vcs,
            &ScriptedGenerator::returning("  \n"),
            &ScriptedVerifier::passing(),
            &ScriptedOperator::answering(true),
            &request(temp.path(), "new.txt"),
        )
        .expect("attempt");
        assert_eq!(report.outcome, AttemptOutcome::Failed);
        assert!(!temp.path().join("new.txt").exists());
    }

    #[test]
    fn verifier_error_and_panic_roll_back() {
        for verifier in [
            ScriptedVerifier::erroring("spawn pnpm: not found"),
            ScriptedVerifier::panicking("boom"),
        ] {
            let temp = tempfile::tempdir().expect("tempdir");
            let vcs = FakeVcs::with_root(temp.path());
            let report = run_attempt(
                &vcs,
                &ScriptedGenerator::returning("content"),
                &verifier,
                &ScriptedOperator::answering(true),
                &request(temp.path(), "fresh/dir/file.ts"),
            )
            .expect("attempt");
            assert_eq!(report.outcome, AttemptOutcome::RolledBack);
            assert_eq!(report.baseline, "absent");
            assert!(!temp.path().join("fresh").exists());
        }
    }

    #[test]
    fn generator_panic_is_a_failed_attempt() {
        let temp = tempfile::tempdir().expect("tempdir");
        let vcs = FakeVcs::with_root(temp.path());
        let report = run_attempt(
            &vcs,
            &ScriptedGenerator::panicking("bad response"),
            &ScriptedVerifier::passing(),
            &ScriptedOperator::answering(true),
            &request(temp.path(), "a.txt"),
        )
        .expect("attempt");
        assert_eq!(report.outcome, AttemptOutcome::Failed);
        let reason = report.failure.expect("failure").reason;
        assert!(reason.contains("generator panicked: bad response"));
    }

    #[test]
    fn cancellation_during_generation_writes_nothing() {
        let temp = tempfile::tempdir().expect("tempdir");
        let vcs = FakeVcs::with_root(temp.path());
        vcs.commit_file("a.txt", b"old");
        let req = request(temp.path(), "a.txt");
        let generator = ScriptedGenerator::returning("new").cancelling(req.cancel.clone());
        let verifier = ScriptedVerifier::passing();
        let report = run_attempt(
            &vcs,
            &generator,
            &verifier,
            &ScriptedOperator::answering(true),
            &req,
        )
        .expect("attempt");

        assert_eq!(report.outcome, AttemptOutcome::Failed);
        assert_eq!(report.failure.map(|f| f.kind), Some(FailureKind::Cancelled));
        assert_eq!(fs::read(temp.path().join("a.txt")).expect("read"), b"old");
        assert_eq!(verifier.calls(), 0);
    }

    #[test]
    fn cancellation_during_verification_rolls_back_even_on_pass() {
        let temp = tempfile::tempdir().expect("tempdir");
        let vcs = FakeVcs::with_root(temp.path());
        vcs.commit_file("a.txt", b"old");
        let req = request(temp.path(), "a.txt");
        let verifier = ScriptedVerifier::passing().cancelling(req.cancel.clone());
        let report = run_attempt(
            &vcs,
            &ScriptedGenerator::returning("new"),
            &verifier,
            &ScriptedOperator::answering(true),
            &req,
        )
        .expect("attempt");

        assert_eq!(report.outcome, AttemptOutcome::RolledBack);
        assert_eq!(report.failure.map(|f| f.kind), Some(FailureKind::Cancelled));
        assert_eq!(vcs.restored_paths(), vec![PathBuf::from("a.txt")]);
        assert_eq!(fs::read(temp.path().join("a.txt")).expect("read"), b"old");
        assert!(report.states.contains(&AttemptState::RollingBack));
    }

    #[test]
    fn attempt_ids_are_unique_within_a_process() {
        let ids: Vec<String> = (0..50).map(|_| new_attempt_id()).collect();
        let mut unique = ids.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), ids.len());
    }

    #[test]
    fn cancelled_before_start_generates_nothing() {
        let temp = tempfile::tempdir().expect("tempdir");
        let vcs = FakeVcs::with_root(temp.path());
        let req = request(temp.path(), "a.txt");
        req.cancel.cancel();
        let generator = ScriptedGenerator::returning("new");
        let report = run_attempt(
            &vcs,
            &generator,
            &ScriptedVerifier::passing(),
            &ScriptedOperator::answering(true),
            &req,
        )
        .expect("attempt");
        assert_eq!(report.outcome, AttemptOutcome::Failed);
        assert_eq!(generator.calls(), 0);
    }

    #[test]
    fn dirty_tree_is_stashed_and_reported() {
        let temp = tempfile::tempdir().expect("tempdir");
        let vcs = FakeVcs::with_root(temp.path());
        vcs.set_dirty(&["notes.md"]);
        let operator = ScriptedOperator::answering(true);
        let report = run_attempt(
            &vcs,
            &ScriptedGenerator::returning("x"),
            &ScriptedVerifier::failing("nope"),
            &operator,
            &request(temp.path(), "a.txt"),
        )
        .expect("attempt");
        let stash = report.stash.expect("stash");
        assert_eq!(vcs.stash_count(), 1);
        assert!(
            operator
                .messages()
                .iter()
                .any(|m| m.contains(&stash.restore_hint()))
        );
    }

    #[test]
    fn rollback_failure_is_fatal_and_names_stash() {
        let temp = tempfile::tempdir().expect("tempdir");
        let vcs = FakeVcs::with_root(temp.path());
        vcs.commit_file("a.txt", b"old");
        vcs.set_dirty(&["notes.md"]);
        vcs.fail_restore("index.lock exists");
        let err = run_attempt(
            &vcs,
            &ScriptedGenerator::returning("new"),
            &ScriptedVerifier::failing("nope"),
            &ScriptedOperator::answering(true),
            &request(temp.path(), "a.txt"),
        )
        .unwrap_err();
        match err {
            MutationError::Rollback { target, stash, .. } => {
                assert_eq!(target, PathBuf::from("a.txt"));
                assert!(stash.is_some());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn target_outside_root_is_rejected_before_any_mutation() {
        let temp = tempfile::tempdir().expect("tempdir");
        let vcs = FakeVcs::with_root(temp.path());
        vcs.set_dirty(&["notes.md"]);
        let generator = ScriptedGenerator::returning("x");
        let err = run_attempt(
            &vcs,
            &generator,
            &ScriptedVerifier::passing(),
            &ScriptedOperator::answering(true),
            &request(temp.path(), "../escape.txt"),
        )
        .unwrap_err();
        assert_eq!(err.kind(), FailureKind::Configuration);
        assert_eq!(vcs.stash_count(), 0);
        assert_eq!(generator.calls(), 0);
    }

    #[test]
    fn held_lock_rejects_attempt() {
        let temp = tempfile::tempdir().expect("tempdir");
        let vcs = FakeVcs::with_root(temp.path());
        let state_dir = vcs.state_dir().expect("state dir");
        let _held = WorkTreeLock::acquire(&state_dir.join("lock"), LockMode::Fail).expect("lock");
        let generator = ScriptedGenerator::returning("x");
        let err = run_attempt(
            &vcs,
            &generator,
            &ScriptedVerifier::passing(),
            &ScriptedOperator::answering(true),
            &request(temp.path(), "a.txt"),
        )
        .unwrap_err();
        assert_eq!(err.kind(), FailureKind::Busy);
        assert_eq!(generator.calls(), 0);
    }

    #[test]
    fn record_is_written_for_each_attempt() {
        let temp = tempfile::tempdir().expect("tempdir");
        let vcs = FakeVcs::with_root(temp.path());
        let report = run_attempt(
            &vcs,
            &ScriptedGenerator::returning("x"),
            &ScriptedVerifier::passing(),
            &ScriptedOperator::answering(true),
            &request(temp.path(), "a.txt"),
        )
        .expect("attempt");
        let dir = report.record_dir.as_ref().expect("record dir");
        let loaded = crate::io::record::load_record(&dir.join("attempt.json")).expect("load");
        assert_eq!(loaded, report);
    }
}
