//! Restore step of the rollback controller.
//!
//! Scope is one path: the target goes back to its baseline and nothing else in
//! the tree is touched, so unrelated uncommitted work survives a rollback.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::core::types::{AppliedChange, Baseline};
use crate::io::applicator::{remove_created_dirs, write_bytes_atomic};
use crate::io::git::VersionControl;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    /// Directories created by the applicator and removed again.
    pub removed_dirs: Vec<PathBuf>,
}

/// Put `root/target` back to `baseline` and confirm it got there.
#[instrument(skip_all, fields(target = %target.display(), baseline = baseline.describe()))]
pub fn restore<V: VersionControl>(
    vcs: &V,
    root: &Path,
    target: &Path,
    baseline: &Baseline,
    change: Option<&AppliedChange>,
    remove_dirs: bool,
) -> Result<RestoreReport> {
    let path = root.join(target);
    let mut report = RestoreReport::default();

    match baseline {
        Baseline::Committed(expected) => {
            vcs.restore_path(target)
                .with_context(|| format!("checkout {} from HEAD", target.display()))?;
            let actual =
                fs::read(&path).with_context(|| format!("read restored {}", path.display()))?;
            if &actual != expected {
                // Checkout filters (eol, smudge) can change bytes; trust git's own comparison.
                let residual = vcs
                    .status(Some(target))
                    .context("re-check restored target")?;
                if !residual.is_empty() {
                    return Err(anyhow!(
                        "{} still differs from its committed content after checkout",
                        target.display()
                    ));
                }
                debug!("restored bytes differ only by checkout filters");
            }
        }
        Baseline::Ignored(expected) => {
            write_bytes_atomic(&path, expected)
                .with_context(|| format!("rewrite saved content of {}", path.display()))?;
        }
        Baseline::Absent => {
            match fs::remove_file(&path) {
                Ok(()) => debug!("removed generated file"),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => {
                    return Err(err).with_context(|| format!("remove {}", path.display()));
                }
            }
            if remove_dirs && let Some(change) = change {
                report.removed_dirs = remove_created_dirs(&change.created_dirs);
                if report.removed_dirs.len() < change.created_dirs.len() {
                    warn!(
                        created = change.created_dirs.len(),
                        removed = report.removed_dirs.len(),
                        "some created directories were kept"
                    );
                }
            }
            if path.exists() {
                return Err(anyhow!("{} still exists after removal", path.display()));
            }
        }
    }

    info!("target restored to baseline");
    Ok(report)
}
