use std::collections::BTreeMap;
use std::fmt;
use voxelbase_author::Session;
use voxelbase_common::ChangeRecord;
use voxelbase_persist::DEFAULT_BRANCH;

/// Read-only view of a session's working set and repository.
pub struct StatusInspector;

impl StatusInspector {
    pub fn report(session: &Session) -> StatusReport {
        let repository = session.store().load().map(|r| r.name);
        let head = if repository.is_some() {
            match session.store().latest_commit_id() {
                Ok(head) => head.map(|id| voxelbase_common::short_id(&id).to_string()),
                Err(e) => {
                    tracing::warn!(error = %e, "cannot resolve HEAD");
                    None
                }
            }
        } else {
            None
        };
        let tracked = session.change_log().snapshot();
        let staged = session.staging().snapshot();
        StatusReport {
            repository,
            branch: DEFAULT_BRANCH.to_string(),
            head,
            tracked: tracked.len(),
            tracked_by_type: count_by_type(&tracked),
            staged: staged.len(),
            staged_by_type: count_by_type(&staged),
        }
    }
}

/// Counts keyed by the record's new type, or its old type for removals.
fn count_by_type(records: &[ChangeRecord]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for state in records.iter().filter_map(ChangeRecord::summary_state) {
        *counts.entry(state.type_id.clone()).or_insert(0) += 1;
    }
    counts
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    /// Repository name; `None` when not initialized.
    pub repository: Option<String>,
    pub branch: String,
    /// Short id of the newest commit.
    pub head: Option<String>,
    pub tracked: usize,
    pub tracked_by_type: BTreeMap<String, usize>,
    pub staged: usize,
    pub staged_by_type: BTreeMap<String, usize>,
}

impl StatusReport {
    pub fn has_uncommitted_work(&self) -> bool {
        self.tracked > 0 || self.staged > 0
    }
}

fn write_breakdown(
    f: &mut fmt::Formatter<'_>,
    counts: &BTreeMap<String, usize>,
    empty: &str,
) -> fmt::Result {
    if counts.is_empty() {
        return writeln!(f, "  ({empty})");
    }
    for (type_id, n) in counts {
        writeln!(f, "  - {type_id}: {n} change{}", if *n == 1 { "" } else { "s" })?;
    }
    Ok(())
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Tracked changes: {}", self.tracked)?;
        write_breakdown(f, &self.tracked_by_type, "no tracked changes")?;
        writeln!(f, "Staged changes: {}", self.staged)?;
        write_breakdown(f, &self.staged_by_type, "no staged changes")?;
        match &self.head {
            Some(head) => writeln!(f, "Branch: {} (HEAD {head})", self.branch)?,
            None => writeln!(f, "Branch: {}", self.branch)?,
        }
        match &self.repository {
            Some(name) => write!(f, "Repository: {name}"),
            None => write!(f, "Repository: not initialized (run `init`)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxelbase_common::{CellPos, CellState};

    #[test]
    fn uninitialized_session() {
        let dir = tempfile::tempdir().unwrap();
        let session = Session::open(dir.path());
        let report = StatusInspector::report(&session);
        assert_eq!(report.repository, None);
        assert_eq!(report.head, None);
        assert!(!report.has_uncommitted_work());
        let text = report.to_string();
        assert!(text.contains("not initialized"));
        assert!(text.contains("(no tracked changes)"));
    }

    #[test]
    fn breakdown_uses_new_then_old_type() {
        let dir = tempfile::tempdir().unwrap();
        let session = Session::open(dir.path());
        session.init(Some("castle"), 0).unwrap();
        let log = session.change_log();
        log.record(CellPos::new(0, 0, 0), None, Some(CellState::new("stone")), 1);
        log.record(CellPos::new(1, 0, 0), None, Some(CellState::new("stone")), 2);
        log.record(CellPos::new(2, 0, 0), Some(CellState::new("dirt")), None, 3);
        session.stage().unwrap();
        let commit = session.commit("base", "a", 10).unwrap();

        log.record(CellPos::new(3, 0, 0), Some(CellState::new("dirt")), None, 4);
        let report = StatusInspector::report(&session);
        assert_eq!(report.repository.as_deref(), Some("castle"));
        assert_eq!(report.head.as_deref(), Some(commit.short_id()));
        assert_eq!(report.tracked, 1);
        assert_eq!(report.tracked_by_type["dirt"], 1);
        assert_eq!(report.staged, 0);

        session.stage().unwrap();
        log.record(CellPos::new(4, 0, 0), None, Some(CellState::new("stone")), 5);
        let report = StatusInspector::report(&session);
        assert_eq!(report.tracked_by_type.get("stone"), Some(&1));
        assert_eq!(report.staged_by_type.get("dirt"), Some(&1));
        let text = report.to_string();
        assert!(text.contains("Branch: main (HEAD "));
        assert!(text.contains("  - dirt: 1 change\n"));
    }
}
