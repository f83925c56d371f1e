use crate::revert::{self, RevertError, RevertSummary};
use crate::{ChangeLog, StagingIndex};
use std::path::Path;
use voxelbase_kernel::{CellWriter, WorldEvent};
use voxelbase_persist::{Commit, CommitStore, Repository, StoreError};

/// Errors from session-level commands.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("commit message must not be empty")]
    EmptyMessage,
    #[error("nothing staged to commit (run `add` first)")]
    NothingStaged,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Per-world authoring session.
///
/// Owns the change log, the staging index and the commit store for one
/// session root. Nothing here is process-global; open one session per world.
#[derive(Debug)]
pub struct Session {
    store: CommitStore,
    change_log: ChangeLog,
    staging: StagingIndex,
}

impl Session {
    /// A session with an empty working set. Does no I/O.
    pub fn open(root: impl AsRef<Path>) -> Self {
        Self {
            store: CommitStore::open(root),
            change_log: ChangeLog::new(),
            staging: StagingIndex::new(),
        }
    }

    /// A session whose working set is reloaded from `changes.json` and `index.json`.
    pub fn resume(root: impl AsRef<Path>) -> Result<Self, SessionError> {
        let store = CommitStore::open(root);
        let change_log = ChangeLog::from_records(store.load_working_changes()?);
        let staging = StagingIndex::new();
        staging.stage_all(store.load_staged()?);
        Ok(Self {
            store,
            change_log,
            staging,
        })
    }

    /// Write the working set so a later [`Session::resume`] picks it up.
    ///
    /// Changes tracked before `init` are kept too, so they can be staged once
    /// the repository exists. An empty working set is not written into a
    /// directory that was never initialized.
    pub fn save_working_set(&self) -> Result<(), SessionError> {
        let changes = self.change_log.snapshot();
        let staged = self.staging.snapshot();
        if changes.is_empty() && staged.is_empty() && self.store.load().is_none() {
            return Ok(());
        }
        self.store.save_working_changes(&changes)?;
        self.store.save_staged(&staged)?;
        Ok(())
    }

    pub fn store(&self) -> &CommitStore {
        &self.store
    }

    pub fn change_log(&self) -> &ChangeLog {
        &self.change_log
    }

    pub fn staging(&self) -> &StagingIndex {
        &self.staging
    }

    pub fn init(&self, name: Option<&str>, now: i64) -> Result<Repository, SessionError> {
        Ok(self.store.init(name, now)?)
    }

    pub fn repository(&self) -> Result<Repository, SessionError> {
        Ok(self.store.require()?)
    }

    /// Feed host mutation events into the change log. Returns how many were recorded.
    pub fn capture(&self, events: impl IntoIterator<Item = WorldEvent>) -> usize {
        let before = self.change_log.count();
        for event in events {
            match event {
                WorldEvent::CellChanged { pos, old, new, tick } => {
                    let clock = i64::try_from(tick).unwrap_or(i64::MAX);
                    self.change_log.record(pos, old, new, clock);
                }
            }
        }
        self.change_log.count().saturating_sub(before)
    }

    /// Stage every change currently in the log, replacing the staged set.
    pub fn stage(&self) -> Result<usize, SessionError> {
        self.store.require()?;
        let snapshot = self.change_log.snapshot();
        self.staging.stage_all(snapshot.iter().cloned());
        Ok(snapshot.len())
    }

    /// Freeze the staged set into a commit on top of the latest one.
    pub fn commit(&self, message: &str, author: &str, now: i64) -> Result<Commit, SessionError> {
        self.store.require()?;
        let message = message.trim();
        if message.is_empty() {
            return Err(SessionError::EmptyMessage);
        }
        let staged = self.staging.snapshot();
        if staged.is_empty() {
            return Err(SessionError::NothingStaged);
        }
        let parent = self.store.latest_commit_id()?;
        let commit = Commit::create(message, author, parent, staged.to_vec(), now);
        self.store.save_commit(&commit)?;
        self.change_log.clear();
        self.staging.clear();
        Ok(commit)
    }

    /// Up to `limit` commits, newest first.
    pub fn log(&self, limit: usize) -> Result<Vec<Commit>, SessionError> {
        self.store.require()?;
        let commits = self.store.list_chronological()?;
        Ok(commits.into_iter().rev().take(limit).collect())
    }

    pub fn reset_hard<W: CellWriter + ?Sized>(
        &self,
        world: &mut W,
        prefix: &str,
    ) -> Result<RevertSummary, RevertError> {
        revert::reset_hard(&self.store, world, &self.change_log, &self.staging, prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxelbase_common::{CellPos, CellState};
    use voxelbase_kernel::VoxelWorld;

    #[test]
    fn commands_require_init() {
        let dir = tempfile::tempdir().unwrap();
        let session = Session::open(dir.path());
        assert!(matches!(session.stage(), Err(SessionError::Store(StoreError::NotInitialized))));
        assert!(matches!(
            session.commit("m", "a", 1),
            Err(SessionError::Store(StoreError::NotInitialized))
        ));
        assert!(matches!(session.log(10), Err(SessionError::Store(StoreError::NotInitialized))));
    }

    #[test]
    fn commit_guards() {
        let dir = tempfile::tempdir().unwrap();
        let session = Session::open(dir.path());
        session.init(None, 0).unwrap();
        assert!(matches!(session.commit("m", "a", 1), Err(SessionError::NothingStaged)));

        let mut world = VoxelWorld::new();
        world.place(CellPos::new(0, 64, 0), CellState::new("minecraft:stone")).unwrap();
        session.capture(world.drain_events());
        session.stage().unwrap();
        assert!(matches!(session.commit("   ", "a", 1), Err(SessionError::EmptyMessage)));
        assert_eq!(session.staging().count(), 1);
    }

    #[test]
    fn commit_clears_working_set_and_chains_parents() {
        let dir = tempfile::tempdir().unwrap();
        let session = Session::open(dir.path());
        session.init(None, 0).unwrap();
        let mut world = VoxelWorld::new();

        world.place(CellPos::new(0, 64, 0), CellState::new("minecraft:stone")).unwrap();
        assert_eq!(session.capture(world.drain_events()), 1);
        assert_eq!(session.stage().unwrap(), 1);
        let first = session.commit("  first  ", "Alice", 100).unwrap();
        assert_eq!(first.message(), "first");
        assert_eq!(session.change_log().count(), 0);
        assert_eq!(session.staging().count(), 0);

        world.break_cell(CellPos::new(0, 64, 0)).unwrap();
        session.capture(world.drain_events());
        session.stage().unwrap();
        let second = session.commit("second", "Alice", 200).unwrap();
        assert_eq!(second.parent_id(), Some(first.id()));

        let log = session.log(10).unwrap();
        assert_eq!(log.iter().map(|c| c.message()).collect::<Vec<_>>(), vec!["second", "first"]);
        assert_eq!(session.log(1).unwrap().len(), 1);
    }

    #[test]
    fn working_set_survives_resume() {
        let dir = tempfile::tempdir().unwrap();
        {
            let session = Session::open(dir.path());
            session.init(None, 0).unwrap();
            let mut world = VoxelWorld::new();
            world.place(CellPos::new(1, 2, 3), CellState::new("minecraft:glass")).unwrap();
            world.place(CellPos::new(4, 5, 6), CellState::new("minecraft:glass")).unwrap();
            session.capture(world.drain_events());
            session.stage().unwrap();
            world.break_cell(CellPos::new(1, 2, 3)).unwrap();
            session.capture(world.drain_events());
            session.save_working_set().unwrap();
        }
        let resumed = Session::resume(dir.path()).unwrap();
        assert_eq!(resumed.change_log().count(), 3);
        assert_eq!(resumed.staging().count(), 2);
    }

    #[test]
    fn changes_before_init_are_kept_and_stageable() {
        let dir = tempfile::tempdir().unwrap();
        {
            let session = Session::open(dir.path());
            session.save_working_set().unwrap();
            assert!(!session.store().data_dir().exists());

            let mut world = VoxelWorld::new();
            world.place(CellPos::new(0, 64, 0), CellState::new("minecraft:stone")).unwrap();
            session.capture(world.drain_events());
            session.save_working_set().unwrap();
        }
        let session = Session::resume(dir.path()).unwrap();
        assert_eq!(session.change_log().count(), 1);
        session.init(None, 0).unwrap();
        assert_eq!(session.stage().unwrap(), 1);
        let commit = session.commit("before init", "a", 1).unwrap();
        assert_eq!(commit.changes().len(), 1);
    }
}
