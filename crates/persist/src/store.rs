//! File-backed commit store.
//!
//! Layout inside the session root:
//! ```text
//! .vcsdata/
//!   repo.json            - repository metadata
//!   HEAD                 - id of the newest commit on the chain
//!   commits/<id>.json    - one file per commit, never overwritten
//!   changes.json         - uncommitted change log (working set)
//!   index.json           - staged changes (working set)
//! ```

use crate::commit::{ChangeWire, Commit};
use crate::repository::{DEFAULT_NAME, Repository};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tempfile::NamedTempFile;
use voxelbase_common::ChangeRecord;

pub const DATA_DIR: &str = ".vcsdata";

const REPO_FILE: &str = "repo.json";
const HEAD_FILE: &str = "HEAD";
const COMMITS_DIR: &str = "commits";
const CHANGES_FILE: &str = "changes.json";
const INDEX_FILE: &str = "index.json";

/// Errors from commit store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("corrupt repository metadata at {path}: {source}")]
    CorruptMetadata {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("commit {0} already exists")]
    CommitExists(String),
    #[error("repository not initialized (run `init` first)")]
    NotInitialized,
}

/// A commit read from disk with the file's modification time.
struct LoadedCommit {
    commit: Commit,
    modified: SystemTime,
}

/// Commit store rooted at `<session>/.vcsdata`.
#[derive(Debug, Clone)]
pub struct CommitStore {
    root: PathBuf,
}

impl CommitStore {
    /// Point a store at `session_root`. No I/O happens until an operation runs.
    pub fn open(session_root: impl AsRef<Path>) -> Self {
        Self {
            root: session_root.as_ref().join(DATA_DIR),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.root
    }

    fn commits_dir(&self) -> PathBuf {
        self.root.join(COMMITS_DIR)
    }

    fn commit_path(&self, id: &str) -> PathBuf {
        self.commits_dir().join(format!("{id}.json"))
    }

    /// Create the repository if absent. An existing repository is returned untouched.
    pub fn init(&self, name: Option<&str>, now: i64) -> Result<Repository, StoreError> {
        if let Some(existing) = self.read_repository()? {
            tracing::debug!(id = %existing.id, "repository already initialized");
            return Ok(existing);
        }
        fs::create_dir_all(self.commits_dir())?;
        let repo = Repository::new(name.unwrap_or(DEFAULT_NAME), now);
        self.save_repository(&repo)?;
        tracing::info!(id = %repo.id, name = %repo.name, root = %self.root.display(), "initialized repository");
        Ok(repo)
    }

    /// The persisted repository, or `None` if never initialized or unreadable.
    pub fn load(&self) -> Option<Repository> {
        match self.read_repository() {
            Ok(repo) => repo,
            Err(e) => {
                tracing::warn!(error = %e, "cannot read repository metadata");
                None
            }
        }
    }

    /// Like [`CommitStore::load`], but absence is an error.
    pub fn require(&self) -> Result<Repository, StoreError> {
        self.read_repository()?.ok_or(StoreError::NotInitialized)
    }

    fn read_repository(&self) -> Result<Option<Repository>, StoreError> {
        let path = self.root.join(REPO_FILE);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|source| StoreError::CorruptMetadata { path, source })
    }

    pub fn save_repository(&self, repo: &Repository) -> Result<(), StoreError> {
        fs::create_dir_all(&self.root)?;
        let json = serde_json::to_string_pretty(repo)?;
        write_atomic(&self.root.join(REPO_FILE), json.as_bytes(), true)
    }

    /// Write `commit` to `commits/<id>.json` and advance `HEAD` to it.
    pub fn save_commit(&self, commit: &Commit) -> Result<PathBuf, StoreError> {
        if self.read_repository()?.is_none() {
            return Err(StoreError::NotInitialized);
        }
        fs::create_dir_all(self.commits_dir())?;
        let path = self.commit_path(commit.id());
        if path.exists() {
            return Err(StoreError::CommitExists(commit.id().to_string()));
        }
        let json = commit.to_json()?;
        write_atomic(&path, json.as_bytes(), false).map_err(|e| match e {
            StoreError::Io(io) if io.kind() == ErrorKind::AlreadyExists => {
                StoreError::CommitExists(commit.id().to_string())
            }
            other => other,
        })?;
        self.set_head(Some(commit.id()))?;
        tracing::info!(id = %commit.short_id(), changes = commit.changes().len(), "saved commit");
        Ok(path)
    }

    /// Load one commit by full id. Files that fail to parse or verify read as absent.
    pub fn load_commit(&self, id: &str) -> Result<Option<Commit>, StoreError> {
        Ok(self.read_commit_file(&self.commit_path(id))?.map(|c| c.commit))
    }

    fn read_commit_file(&self, path: &Path) -> Result<Option<LoadedCommit>, StoreError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let modified = fs::metadata(path)?.modified()?;
        let commit = match Commit::from_json(&text) {
            Ok(commit) => commit,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unreadable commit file");
                return Ok(None);
            }
        };
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
        if stem != commit.id() || !commit.verify() {
            tracing::warn!(path = %path.display(), id = %commit.id(), "skipping commit whose id does not match its contents");
            return Ok(None);
        }
        Ok(Some(LoadedCommit { commit, modified }))
    }

    /// Current `HEAD` pointer, if any.
    pub fn head(&self) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.root.join(HEAD_FILE)) {
            Ok(text) => {
                let id = text.trim();
                Ok((!id.is_empty()).then(|| id.to_string()))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Move `HEAD`. `None` removes the pointer (empty history).
    pub fn set_head(&self, id: Option<&str>) -> Result<(), StoreError> {
        let path = self.root.join(HEAD_FILE);
        match id {
            Some(id) => write_atomic(&path, id.as_bytes(), true),
            None => match fs::remove_file(&path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            },
        }
    }

    /// Id of the newest commit, or `None` for an empty history.
    pub fn latest_commit_id(&self) -> Result<Option<String>, StoreError> {
        if let Some(head) = self.head()? {
            if self.load_commit(&head)?.is_some() {
                return Ok(Some(head));
            }
            tracing::warn!(head = %head, "HEAD names a missing commit; falling back to file order");
        }
        Ok(self.list_chronological()?.last().map(|c| c.id().to_string()))
    }

    /// All readable commits, oldest first.
    pub fn list_chronological(&self) -> Result<Vec<Commit>, StoreError> {
        let mut loaded = self.load_all()?;
        if loaded.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(head) = self.head()? {
            match walk_chain(&loaded, &head) {
                Some(chain) if chain.len() == loaded.len() => {
                    let mut by_id: HashMap<String, Commit> = loaded
                        .into_iter()
                        .map(|l| (l.commit.id().to_string(), l.commit))
                        .collect();
                    return Ok(chain.iter().filter_map(|id| by_id.remove(id)).collect());
                }
                _ => tracing::debug!(head = %head, "parent chain incomplete; ordering by modification time"),
            }
        }
        loaded.sort_by(|a, b| {
            a.modified
                .cmp(&b.modified)
                .then(a.commit.timestamp().cmp(&b.commit.timestamp()))
                .then_with(|| a.commit.id().cmp(b.commit.id()))
        });
        Ok(loaded.into_iter().map(|l| l.commit).collect())
    }

    fn load_all(&self) -> Result<Vec<LoadedCommit>, StoreError> {
        let entries = match fs::read_dir(self.commits_dir()) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut loaded = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(commit) = self.read_commit_file(&path)? {
                loaded.push(commit);
            }
        }
        Ok(loaded)
    }

    /// Remove a commit file. Deleting an absent commit is a no-op.
    pub fn delete_commit(&self, id: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.commit_path(id)) {
            Ok(()) => {
                tracing::info!(id = %voxelbase_common::short_id(id), "deleted commit");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Persist the uncommitted change log.
    pub fn save_working_changes(&self, changes: &[ChangeRecord]) -> Result<(), StoreError> {
        self.save_records(CHANGES_FILE, changes)
    }

    pub fn load_working_changes(&self) -> Result<Vec<ChangeRecord>, StoreError> {
        self.load_records(CHANGES_FILE)
    }

    /// Persist the staged set.
    pub fn save_staged(&self, changes: &[ChangeRecord]) -> Result<(), StoreError> {
        self.save_records(INDEX_FILE, changes)
    }

    pub fn load_staged(&self) -> Result<Vec<ChangeRecord>, StoreError> {
        self.load_records(INDEX_FILE)
    }

    fn save_records(&self, file: &str, changes: &[ChangeRecord]) -> Result<(), StoreError> {
        fs::create_dir_all(&self.root)?;
        let wires: Vec<ChangeWire> = changes.iter().map(ChangeWire::from).collect();
        let json = serde_json::to_string_pretty(&wires)?;
        write_atomic(&self.root.join(file), json.as_bytes(), true)
    }

    fn load_records(&self, file: &str) -> Result<Vec<ChangeRecord>, StoreError> {
        let text = match fs::read_to_string(self.root.join(file)) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let wires: Vec<ChangeWire> = serde_json::from_str(&text)?;
        let mut records = Vec::with_capacity(wires.len());
        for (index, wire) in wires.into_iter().enumerate() {
            match wire.into_record(index) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!(file, error = %e, "skipping malformed change record"),
            }
        }
        Ok(records)
    }
}

/// Ids from the root to `head` following parent links, or `None` when the
/// walk hits a missing commit or a cycle.
fn walk_chain(loaded: &[LoadedCommit], head: &str) -> Option<Vec<String>> {
    let by_id: HashMap<&str, &Commit> = loaded.iter().map(|l| (l.commit.id(), &l.commit)).collect();
    let mut seen = HashSet::new();
    let mut chain = Vec::new();
    let mut cursor = Some(head);
    while let Some(id) = cursor {
        let commit = by_id.get(id)?;
        if !seen.insert(id) {
            return None;
        }
        chain.push(id.to_string());
        cursor = commit.parent_id();
    }
    chain.reverse();
    Some(chain)
}

/// Write through a temp file in the same directory, fsync, then rename into place.
/// With `clobber == false` an existing target fails with `AlreadyExists`.
fn write_atomic(path: &Path, contents: &[u8], clobber: bool) -> Result<(), StoreError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    if clobber {
        tmp.persist(path).map_err(|e| e.error)?;
    } else {
        tmp.persist_noclobber(path).map_err(|e| e.error)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use voxelbase_common::{CellPos, CellState};

    fn placed(x: i32, ts: i64) -> ChangeRecord {
        ChangeRecord::placed(CellPos::new(x, 64, 0), CellState::new("minecraft:stone"), ts)
    }

    fn commit_on(store: &CommitStore, message: &str, ts: i64) -> Commit {
        let parent = store.latest_commit_id().unwrap();
        let commit = Commit::create(message, "tester", parent, vec![placed(ts as i32, ts)], ts);
        store.save_commit(&commit).unwrap();
        commit
    }

    fn set_mtime(store: &CommitStore, id: &str, secs: u64) {
        let file = fs::File::options().write(true).open(store.commit_path(id)).unwrap();
        file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
            .unwrap();
    }

    #[test]
    fn init_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = CommitStore::open(dir.path());
        assert!(store.load().is_none());
        let first = store.init(Some("castle"), 10).unwrap();
        let second = store.init(Some("other"), 20).unwrap();
        assert_eq!(first, second);
        assert_eq!(store.load().unwrap().name, "castle");
        assert!(dir.path().join(".vcsdata/commits").is_dir());
    }

    #[test]
    fn corrupt_metadata_reads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = CommitStore::open(dir.path());
        fs::create_dir_all(store.data_dir()).unwrap();
        fs::write(store.data_dir().join(REPO_FILE), "{not json").unwrap();
        assert!(store.load().is_none());
        assert!(matches!(store.init(None, 0), Err(StoreError::CorruptMetadata { .. })));
    }

    #[test]
    fn save_requires_init() {
        let dir = tempfile::tempdir().unwrap();
        let store = CommitStore::open(dir.path());
        let commit = Commit::create("m", "a", None, vec![placed(0, 1)], 1);
        assert!(matches!(store.save_commit(&commit), Err(StoreError::NotInitialized)));
    }

    #[test]
    fn commits_are_never_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let store = CommitStore::open(dir.path());
        store.init(None, 0).unwrap();
        let commit = commit_on(&store, "first", 1);
        assert!(matches!(
            store.save_commit(&commit),
            Err(StoreError::CommitExists(id)) if id == commit.id()
        ));
    }

    #[test]
    fn chain_order_follows_head() {
        let dir = tempfile::tempdir().unwrap();
        let store = CommitStore::open(dir.path());
        store.init(None, 0).unwrap();
        let a = commit_on(&store, "a", 1);
        let b = commit_on(&store, "b", 2);
        let c = commit_on(&store, "c", 3);
        // Reverse the mtimes; the chain still wins.
        set_mtime(&store, a.id(), 300);
        set_mtime(&store, b.id(), 200);
        set_mtime(&store, c.id(), 100);

        let ids: Vec<_> = store
            .list_chronological()
            .unwrap()
            .iter()
            .map(|c| c.id().to_string())
            .collect();
        assert_eq!(ids, vec![a.id(), b.id(), c.id()]);
        assert_eq!(store.latest_commit_id().unwrap().as_deref(), Some(c.id()));
        assert_eq!(c.parent_id(), Some(b.id()));
    }

    #[test]
    fn falls_back_to_mtime_without_head() {
        let dir = tempfile::tempdir().unwrap();
        let store = CommitStore::open(dir.path());
        store.init(None, 0).unwrap();
        let a = commit_on(&store, "a", 1);
        let b = commit_on(&store, "b", 2);
        store.set_head(None).unwrap();
        set_mtime(&store, a.id(), 200);
        set_mtime(&store, b.id(), 100);

        let listed = store.list_chronological().unwrap();
        assert_eq!(listed[0].id(), b.id());
        assert_eq!(listed[1].id(), a.id());
        assert_eq!(store.latest_commit_id().unwrap().as_deref(), Some(a.id()));
    }

    #[test]
    fn mtime_ties_break_on_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let store = CommitStore::open(dir.path());
        store.init(None, 0).unwrap();
        let late = Commit::create("late", "t", None, vec![placed(1, 50)], 50);
        let early = Commit::create("early", "t", None, vec![placed(2, 10)], 10);
        store.save_commit(&late).unwrap();
        store.save_commit(&early).unwrap();
        store.set_head(None).unwrap();
        set_mtime(&store, late.id(), 100);
        set_mtime(&store, early.id(), 100);

        let listed = store.list_chronological().unwrap();
        assert_eq!(listed[0].id(), early.id());
        assert_eq!(listed[1].id(), late.id());
    }

    #[test]
    fn tampered_and_garbage_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = CommitStore::open(dir.path());
        store.init(None, 0).unwrap();
        let good = commit_on(&store, "good", 1);

        fs::write(store.commits_dir().join("garbage.json"), "{\"id\":").unwrap();
        let forged = good.to_json().unwrap().replace("\"good\"", "\"evil\"");
        fs::write(store.commits_dir().join(format!("{}x.json", good.id())), forged).unwrap();
        fs::write(store.commits_dir().join("notes.txt"), "ignored").unwrap();

        let listed = store.list_chronological().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].message(), "good");
    }

    #[test]
    fn stale_head_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = CommitStore::open(dir.path());
        store.init(None, 0).unwrap();
        let a = commit_on(&store, "a", 1);
        store.set_head(Some("deadbeef")).unwrap();
        assert_eq!(store.latest_commit_id().unwrap().as_deref(), Some(a.id()));
    }

    #[test]
    fn delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = CommitStore::open(dir.path());
        store.init(None, 0).unwrap();
        let a = commit_on(&store, "a", 1);
        store.delete_commit(a.id()).unwrap();
        store.delete_commit(a.id()).unwrap();
        store.delete_commit("never-existed").unwrap();
        assert!(store.load_commit(a.id()).unwrap().is_none());
    }

    #[test]
    fn empty_history() {
        let dir = tempfile::tempdir().unwrap();
        let store = CommitStore::open(dir.path());
        store.init(None, 0).unwrap();
        assert!(store.list_chronological().unwrap().is_empty());
        assert_eq!(store.latest_commit_id().unwrap(), None);
    }

    #[test]
    fn working_set_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = CommitStore::open(dir.path());
        assert!(store.load_working_changes().unwrap().is_empty());

        let changes = vec![
            placed(1, 1),
            ChangeRecord::modified(
                CellPos::new(2, 2, 2),
                CellState::new("minecraft:oak_door").with_property("open", "false"),
                CellState::new("minecraft:oak_door").with_property("open", "true"),
                2,
            ),
        ];
        store.save_working_changes(&changes).unwrap();
        store.save_staged(&changes[..1]).unwrap();
        assert_eq!(store.load_working_changes().unwrap(), changes);
        assert_eq!(store.load_staged().unwrap(), changes[..1].to_vec());
    }
}
