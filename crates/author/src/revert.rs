//! Hard reset: undo every commit newer than a target and prune them.

use crate::{ChangeLog, StagingIndex};
use voxelbase_common::{CellPos, short_id};
use voxelbase_kernel::{CellWriter, WriteError};
use voxelbase_persist::{Commit, CommitStore, StoreError};

/// A store update that failed after the world had already been reverted.
#[derive(Debug, thiserror::Error)]
pub enum PruneFailure {
    #[error("could not delete commit {}: {error}", short_id(.commit))]
    Delete { commit: String, error: StoreError },
    #[error("could not move HEAD: {0}")]
    Head(StoreError),
}

/// Outcome of a hard reset whose world writes all succeeded.
#[derive(Debug)]
pub struct RevertSummary {
    /// Full id of the commit the store now ends at.
    pub target: String,
    /// Ids of the undone commits, newest first.
    pub reverted: Vec<String>,
    /// Inverse writes applied to the world.
    pub records_applied: usize,
    /// Store updates that failed; affected commit files are still on disk.
    pub prune_errors: Vec<PruneFailure>,
}

impl RevertSummary {
    pub fn already_at_target(&self) -> bool {
        self.reverted.is_empty()
    }
}

/// What was and was not undone when a write failed mid-reset.
#[derive(Debug)]
pub struct PartialRevert {
    /// Commits whose records were all undone; these were pruned.
    pub fully_applied: Vec<String>,
    /// The commit being undone when the write failed; kept in the store.
    pub failed_commit: String,
    /// Records of `failed_commit` that were undone before the failure.
    pub applied_in_failed: usize,
    /// Records of `failed_commit` that were not undone.
    pub remaining_in_failed: usize,
    /// Older commits that were never touched; kept in the store.
    pub untouched: Vec<String>,
    pub position: CellPos,
    pub error: WriteError,
    /// Store updates that failed while pruning `fully_applied`.
    pub prune_errors: Vec<PruneFailure>,
}

#[derive(Debug, thiserror::Error)]
pub enum RevertError {
    #[error("no commit matches '{0}'")]
    NotFound(String),
    #[error("'{prefix}' is ambiguous; candidates: {}", .candidates.join(", "))]
    Ambiguous {
        prefix: String,
        candidates: Vec<String>,
    },
    #[error(
        "reset stopped at commit {} ({} of its changes undone): write to {} failed: {}",
        short_id(&.0.failed_commit),
        .0.applied_in_failed,
        .0.position,
        .0.error
    )]
    PartialApply(Box<PartialRevert>),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Revert the world and store to the unique commit whose id starts with `prefix`.
///
/// Commits after the target are undone newest first, each one's records in
/// reverse. A record's old state is written back, or the cell is cleared
/// when there was none. Fully undone commits are then deleted and `HEAD`
/// moves to the target; the change log and staging index are cleared.
///
/// Lookup failures leave everything untouched. A failed write stops the
/// reset: commits already fully undone are pruned, the rest are kept, and
/// the working set is left alone.
pub fn reset_hard<W: CellWriter + ?Sized>(
    store: &CommitStore,
    world: &mut W,
    change_log: &ChangeLog,
    staging: &StagingIndex,
    prefix: &str,
) -> Result<RevertSummary, RevertError> {
    store.require()?;
    let commits = store.list_chronological()?;
    let target_index = resolve(&commits, prefix)?;
    let target = commits[target_index].id().to_string();
    let to_revert = &commits[target_index + 1..];

    if to_revert.is_empty() {
        tracing::info!(commit = %short_id(&target), "already at commit");
        return Ok(RevertSummary {
            target,
            reverted: Vec::new(),
            records_applied: 0,
            prune_errors: Vec::new(),
        });
    }

    let mut reverted: Vec<String> = Vec::with_capacity(to_revert.len());
    let mut records_applied = 0;
    for (i, commit) in to_revert.iter().enumerate().rev() {
        if let Err((applied, position, error)) = undo_commit(world, commit) {
            let prune_errors = prune(store, &reverted, commit.id());
            let partial = PartialRevert {
                fully_applied: reverted,
                failed_commit: commit.id().to_string(),
                applied_in_failed: applied,
                remaining_in_failed: commit.changes().len() - applied,
                untouched: to_revert[..i].iter().map(|c| c.id().to_string()).collect(),
                position,
                error,
                prune_errors,
            };
            tracing::warn!(
                failed = %commit.short_id(),
                pruned = partial.fully_applied.len(),
                "hard reset stopped by a failed write"
            );
            return Err(RevertError::PartialApply(Box::new(partial)));
        }
        records_applied += commit.changes().len();
        reverted.push(commit.id().to_string());
    }

    let prune_errors = prune(store, &reverted, &target);
    change_log.clear();
    staging.clear();
    tracing::info!(
        commit = %short_id(&target),
        reverted = reverted.len(),
        records = records_applied,
        prune_errors = prune_errors.len(),
        "hard reset complete"
    );
    Ok(RevertSummary {
        target,
        reverted,
        records_applied,
        prune_errors,
    })
}

/// Delete the undone commits and point `HEAD` at `head`. Every step is
/// attempted; failures are collected rather than returned early.
fn prune(store: &CommitStore, undone: &[String], head: &str) -> Vec<PruneFailure> {
    let mut failures = Vec::new();
    for id in undone {
        if let Err(error) = store.delete_commit(id) {
            tracing::warn!(id = %short_id(id), error = %error, "failed to delete reverted commit");
            failures.push(PruneFailure::Delete {
                commit: id.clone(),
                error,
            });
        }
    }
    if let Err(error) = store.set_head(Some(head)) {
        tracing::warn!(error = %error, "failed to move HEAD after reset");
        failures.push(PruneFailure::Head(error));
    }
    failures
}

/// Index of the single commit whose id starts with `prefix`.
fn resolve(commits: &[Commit], prefix: &str) -> Result<usize, RevertError> {
    if prefix.is_empty() {
        return Err(RevertError::NotFound(prefix.to_string()));
    }
    let matches: Vec<usize> = commits
        .iter()
        .enumerate()
        .filter(|(_, c)| c.id().starts_with(prefix))
        .map(|(i, _)| i)
        .collect();
    match matches.as_slice() {
        [] => Err(RevertError::NotFound(prefix.to_string())),
        [only] => Ok(*only),
        many => Err(RevertError::Ambiguous {
            prefix: prefix.to_string(),
            candidates: many
                .iter()
                .map(|&i| commits[i].short_id().to_string())
                .collect(),
        }),
    }
}

/// Undo one commit's records in reverse. On failure returns how many were
/// undone and the failing write.
fn undo_commit<W: CellWriter + ?Sized>(
    world: &mut W,
    commit: &Commit,
) -> Result<(), (usize, CellPos, WriteError)> {
    for (applied, record) in commit.changes().iter().rev().enumerate() {
        let restore = record.old_state().cloned();
        world
            .write_cell(record.position(), restore)
            .map_err(|e| (applied, record.position(), e))?;
    }
    Ok(())
}
