use crate::client::{RemoteClient, RemoteError};
use crate::wire::{CommitPayload, RepositoryPayload};
use std::fmt;
use voxelbase_common::short_id;
use voxelbase_persist::{CommitStore, Repository, StoreError};

/// One commit the remote did not accept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushFailure {
    pub commit_id: String,
    pub reason: String,
}

/// Per-commit outcome of a push.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushReport {
    /// Remote repository id the commits were sent to.
    pub target: String,
    pub pushed: Vec<String>,
    pub failures: Vec<PushFailure>,
}

impl PushReport {
    pub fn pushed_count(&self) -> usize {
        self.pushed.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failures.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for PushReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pushed {} commit(s) to {}", self.pushed_count(), self.target)?;
        if !self.is_clean() {
            write!(f, ", {} failed", self.failed_count())?;
            for failure in &self.failures {
                write!(f, "\n  {}: {}", short_id(&failure.commit_id), failure.reason)?;
            }
        }
        Ok(())
    }
}

/// Push every local commit, oldest first, to `repo`'s remote repository.
///
/// Only reading the local store can fail the whole call; remote errors are
/// collected per commit.
pub fn push_all<C: RemoteClient + ?Sized>(
    store: &CommitStore,
    repo: &Repository,
    client: &C,
) -> Result<PushReport, StoreError> {
    let target = repo.push_target_id().to_string();
    let mut report = PushReport {
        target: target.clone(),
        ..PushReport::default()
    };
    for commit in store.list_chronological()? {
        let payload = CommitPayload::from(&commit);
        match client.push_commit(&target, &payload) {
            Ok(()) => report.pushed.push(commit.id().to_string()),
            Err(e) => {
                tracing::warn!(id = %commit.short_id(), error = %e, "push failed for commit");
                report.failures.push(PushFailure {
                    commit_id: commit.id().to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }
    tracing::info!(
        target_repo = %target,
        pushed = report.pushed_count(),
        failed = report.failed_count(),
        "push complete"
    );
    Ok(report)
}

/// Announce `repo` to the remote under its push target id.
pub fn create_remote_repository<C: RemoteClient + ?Sized>(
    client: &C,
    repo: &Repository,
) -> Result<(), RemoteError> {
    client.create_repository(&RepositoryPayload::for_repository(repo, repo.push_target_id()))
}
