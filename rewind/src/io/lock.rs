//! Work-tree lock serializing mutation attempts.
//!
//! Status check, stash, write and checkout are separate git/file operations
//! with no transaction around them, so two attempts against the same tree must
//! never overlap. The lock is an advisory `flock` on a file in the git
//! directory and is released when [`WorkTreeLock`] is dropped.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fs2::FileExt;
use tracing::debug;

use crate::io::config::LockMode;

#[derive(Debug)]
pub struct WorkTreeLock {
    file: File,
    path: PathBuf,
}

/// Another attempt holds the lock and `LockMode::Fail` was requested.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("another mutation attempt holds {}", path.display())]
pub struct LockBusy {
    pub path: PathBuf,
}

impl WorkTreeLock {
    /// Acquire the lock at `path`, creating the file and its parent if needed.
    ///
    /// With `LockMode::Fail` a held lock yields a [`LockBusy`] error (downcastable
    /// from the returned `anyhow::Error`).
    pub fn acquire(path: &Path, mode: LockMode) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create lock dir {}", parent.display()))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)
            .with_context(|| format!("open lock {}", path.display()))?;

        match mode {
            LockMode::Wait => {
                debug!(path = %path.display(), "waiting for work-tree lock");
                file.lock_exclusive()
                    .with_context(|| format!("acquire lock {}", path.display()))?;
            }
            LockMode::Fail => {
                if let Err(err) = file.try_lock_exclusive() {
                    if err.kind() == fs2::lock_contended_error().kind() {
                        return Err(LockBusy {
                            path: path.to_path_buf(),
                        }
                        .into());
                    }
                    return Err(err).with_context(|| format!("acquire lock {}", path.display()));
                }
            }
        }

        // Holder pid is informational only; the flock is what excludes.
        file.set_len(0)
            .with_context(|| format!("truncate lock {}", path.display()))?;
        writeln!(file, "{}", std::process::id())
            .with_context(|| format!("write lock {}", path.display()))?;

        debug!(path = %path.display(), "work-tree lock acquired");
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WorkTreeLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_is_rejected_while_held() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("state").join("lock");
        let held = WorkTreeLock::acquire(&path, LockMode::Fail).expect("first lock");
        let err = WorkTreeLock::acquire(&path, LockMode::Fail).unwrap_err();
        let busy = err.downcast_ref::<LockBusy>().expect("busy error");
        assert_eq!(busy.path, path);
        drop(held);
        WorkTreeLock::acquire(&path, LockMode::Fail).expect("lock after release");
    }

    #[test]
    fn wait_mode_blocks_until_release() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("lock");
        let held = WorkTreeLock::acquire(&path, LockMode::Fail).expect("first lock");
        let waiter_path = path.clone();
        let waiter = std::thread::spawn(move || {
            WorkTreeLock::acquire(&waiter_path, LockMode::Wait).map(|_| ())
        });
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert!(!waiter.is_finished());
        drop(held);
        waiter.join().expect("join").expect("waiter acquired");
    }
}
