//! Attempt records (`<git-dir>/rewind/attempts/<id>/attempt.json`).
//!
//! Records live inside the git directory so writing them never dirties the
//! working tree. They are informational: a failed write is logged by the caller
//! and does not change the attempt's outcome.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::attempt::AttemptReport;
use crate::io::applicator::write_bytes_atomic;

pub const RECORD_FILE_NAME: &str = "attempt.json";

/// Directory holding one subdirectory per attempt.
pub fn attempts_dir(state_dir: &Path) -> PathBuf {
    state_dir.join("attempts")
}

/// Atomically write `report` as `dir/attempt.json`.
pub fn write_record(dir: &Path, report: &AttemptReport) -> Result<()> {
    debug!(dir = %dir.display(), attempt_id = %report.attempt_id, "writing attempt record");
    fs::create_dir_all(dir).with_context(|| format!("create directory {}", dir.display()))?;
    let mut buf = serde_json::to_string_pretty(report)?;
    buf.push('\n');
    write_bytes_atomic(&dir.join(RECORD_FILE_NAME), buf.as_bytes())
}

pub fn load_record(path: &Path) -> Result<AttemptReport> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read record {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse record {}", path.display()))
}

/// Most recent records first, at most `limit`. Unreadable records are skipped.
pub fn list_records(state_dir: &Path, limit: usize) -> Result<Vec<AttemptReport>> {
    let dir = attempts_dir(state_dir);
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut ids = Vec::new();
    for entry in fs::read_dir(&dir).with_context(|| format!("read {}", dir.display()))? {
        let entry = entry.with_context(|| format!("read entry in {}", dir.display()))?;
        if entry.path().join(RECORD_FILE_NAME).is_file() {
            ids.push(entry.file_name());
        }
    }
    // Ids start with a timestamp, so lexical order is chronological.
    ids.sort();
    ids.reverse();

    let mut records = Vec::new();
    for id in ids.into_iter().take(limit) {
        let path = dir.join(&id).join(RECORD_FILE_NAME);
        match load_record(&path) {
            Ok(record) => records.push(record),
            Err(err) => warn!(path = %path.display(), err = %format!("{err:#}"), "skipping record"),
        }
    }
    Ok(records)
}
