//! Change applicator: replaces the target file in one step.
//!
//! Content goes to a sibling temp file first and is renamed over the target, so
//! an interrupted write leaves either the old file or the new one, never a
//! truncated mix. Directories created on the way are recorded so a rollback of
//! a brand-new file can remove them again.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};

use crate::core::types::AppliedChange;

/// Write `content` to `root/target`, replacing any existing content in full.
///
/// On error nothing is left behind: the temp file and any directories created
/// by this call are removed before returning.
#[instrument(skip_all, fields(target = %target.display(), bytes = content.len()))]
pub fn apply(root: &Path, target: &Path, content: &str) -> Result<AppliedChange> {
    let path = root.join(target);
    let parent = path
        .parent()
        .ok_or_else(|| anyhow!("target {} has no parent directory", path.display()))?
        .to_path_buf();

    let created_dirs = missing_ancestors(root, &parent);
    if let Err(err) = fs::create_dir_all(&parent) {
        remove_created_dirs(&created_dirs);
        return Err(err).with_context(|| format!("create directory {}", parent.display()));
    }
    if !created_dirs.is_empty() {
        debug!(count = created_dirs.len(), "created parent directories");
    }

    let tmp_path = temp_path_for(&path)?;
    if let Err(err) = write_and_rename(&tmp_path, &path, content.as_bytes()) {
        if tmp_path.exists()
            && let Err(cleanup) = fs::remove_file(&tmp_path)
        {
            warn!(path = %tmp_path.display(), err = %cleanup, "failed to remove temp file");
        }
        remove_created_dirs(&created_dirs);
        return Err(err);
    }

    Ok(AppliedChange {
        path,
        created_dirs,
        bytes: content.len(),
    })
}

/// Atomically replace `path` with `content` (temp file + rename).
///
/// Used by rollback to put back bytes that git cannot restore.
pub fn write_bytes_atomic(path: &Path, content: &[u8]) -> Result<()> {
    let tmp_path = temp_path_for(path)?;
    let result = write_and_rename(&tmp_path, path, content);
    if result.is_err() && tmp_path.exists() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}

fn write_and_rename(tmp_path: &Path, path: &Path, content: &[u8]) -> Result<()> {
    let mut file = File::create(tmp_path)
        .with_context(|| format!("create temp file {}", tmp_path.display()))?;
    file.write_all(content)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    file.sync_all()
        .with_context(|| format!("sync temp file {}", tmp_path.display()))?;
    drop(file);
    match fs::metadata(path) {
        // The replacement keeps the mode of the file it replaces.
        Ok(meta) => fs::set_permissions(tmp_path, meta.permissions())
            .with_context(|| format!("copy permissions to {}", tmp_path.display()))?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e).with_context(|| format!("stat {}", path.display())),
    }
    fs::rename(tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

fn temp_path_for(path: &Path) -> Result<PathBuf> {
    let name = path
        .file_name()
        .ok_or_else(|| anyhow!("target {} has no file name", path.display()))?;
    let tmp_name = format!(
        ".{}.rewind-{}.tmp",
        name.to_string_lossy(),
        std::process::id()
    );
    Ok(path.with_file_name(tmp_name))
}

/// Ancestors of `dir` (inclusive, not above `root`) that do not exist yet, outermost first.
fn missing_ancestors(root: &Path, dir: &Path) -> Vec<PathBuf> {
    let mut missing = Vec::new();
    let mut current = Some(dir);
    while let Some(candidate) = current {
        if candidate == root || candidate.exists() || !candidate.starts_with(root) {
            break;
        }
        missing.push(candidate.to_path_buf());
        current = candidate.parent();
    }
    missing.reverse();
    missing
}

/// Remove `dirs` deepest first, stopping at the first one that is not empty.
///
/// Returns the directories actually removed.
pub fn remove_created_dirs(dirs: &[PathBuf]) -> Vec<PathBuf> {
    let mut removed = Vec::new();
    for dir in dirs.iter().rev() {
        match fs::read_dir(dir) {
            Ok(mut entries) => {
                if entries.next().is_some() {
                    debug!(dir = %dir.display(), "directory not empty, keeping it");
                    break;
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
            Err(err) => {
                warn!(dir = %dir.display(), err = %err, "cannot inspect created directory");
                break;
            }
        }
        if let Err(err) = fs::remove_dir(dir) {
            warn!(dir = %dir.display(), err = %err, "failed to remove created directory");
            break;
        }
        removed.push(dir.clone());
    }
    removed
}
