//! `rewind status`: what an operator needs to know before or after an attempt.

use anyhow::{Context, Result};
use serde::Serialize;

use crate::attempt::AttemptReport;
use crate::core::types::StashRecord;
use crate::guard::STASH_PREFIX;
use crate::io::git::{StatusEntry, VersionControl};
use crate::io::record::list_records;

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub clean: bool,
    pub entries: Vec<StatusEntry>,
    /// Stashes pushed by earlier attempts, newest first.
    pub stashes: Vec<StashRecord>,
    /// Latest attempt records, newest first.
    pub recent: Vec<AttemptReport>,
}

pub fn collect_status<V: VersionControl>(vcs: &V, recent_limit: usize) -> Result<StatusReport> {
    let entries = vcs.status(None).context("inspect working tree")?;
    let stashes = vcs
        .list_stashes(STASH_PREFIX)
        .context("list workflow stashes")?;
    let state_dir = vcs.state_dir()?;
    let recent = list_records(&state_dir, recent_limit)?;
    Ok(StatusReport {
        clean: entries.is_empty(),
        entries,
        stashes,
        recent,
    })
}

/// Human-readable rendering for the terminal.
pub fn render_status(report: &StatusReport) -> String {
    let mut out = String::new();
    if report.clean {
        out.push_str("Working tree is clean.\n");
    } else {
        out.push_str(&format!(
            "Working tree has {} uncommitted change(s):\n",
            report.entries.len()
        ));
        for entry in &report.entries {
            out.push_str(&format!("  {} {}\n", entry.code, entry.path));
        }
    }

    if !report.stashes.is_empty() {
        out.push_str("\nStashes created by rewind (restore manually):\n");
        for stash in &report.stashes {
            out.push_str(&format!("  {}\n    {}\n", stash.label, stash.restore_hint()));
        }
    }

    if !report.recent.is_empty() {
        out.push_str("\nRecent attempts:\n");
        for record in &report.recent {
            out.push_str(&format!(
                "  {} {} {}\n",
                record.attempt_id,
                record.outcome.as_str(),
                record.target.display()
            ));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeVcs;

    #[test]
    fn lists_dirty_entries_and_workflow_stashes() {
        let temp = tempfile::tempdir().expect("tempdir");
        let vcs = FakeVcs::with_root(temp.path());
        vcs.set_dirty(&["notes.md"]);
        vcs.stash_push("rewind: 1 before a.txt").expect("stash");
        vcs.set_dirty(&["draft.md"]);

        let report = collect_status(&vcs, 5).expect("status");
        assert!(!report.clean);
        assert_eq!(report.stashes.len(), 1);

        let text = render_status(&report);
        assert!(text.contains("draft.md"));
        assert!(text.contains("rewind: 1 before a.txt"));
        assert!(text.contains("git stash apply fakestash0"));
    }

    #[test]
    fn clean_tree_without_history() {
        let temp = tempfile::tempdir().expect("tempdir");
        let report = collect_status(&FakeVcs::with_root(temp.path()), 5).expect("status");
        assert!(report.clean);
        assert_eq!(render_status(&report), "Working tree is clean.\n");
    }
}
