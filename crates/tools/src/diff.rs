use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use voxelbase_common::{CellPos, CellState};
use voxelbase_kernel::CellReader;
use voxelbase_persist::{Commit, CommitStore};

/// Classification of positions between a historical commit and live state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "DiffRepr", into = "DiffRepr")]
pub struct DiffResult {
    /// State each compared position had as of the target commit (`None` = empty).
    pub previous_states: BTreeMap<CellPos, Option<CellState>>,
    pub added: BTreeSet<CellPos>,
    pub removed: BTreeSet<CellPos>,
    pub modified: BTreeSet<CellPos>,
}

/// JSON form: map keys must be strings, so previous states are an entry list.
#[derive(Serialize, Deserialize)]
struct DiffRepr {
    previous: Vec<PreviousEntry>,
    added: Vec<CellPos>,
    removed: Vec<CellPos>,
    modified: Vec<CellPos>,
}

#[derive(Serialize, Deserialize)]
struct PreviousEntry {
    #[serde(flatten)]
    pos: CellPos,
    state: Option<CellState>,
}

impl From<DiffResult> for DiffRepr {
    fn from(result: DiffResult) -> Self {
        Self {
            previous: result
                .previous_states
                .into_iter()
                .map(|(pos, state)| PreviousEntry { pos, state })
                .collect(),
            added: result.added.into_iter().collect(),
            removed: result.removed.into_iter().collect(),
            modified: result.modified.into_iter().collect(),
        }
    }
}

impl From<DiffRepr> for DiffResult {
    fn from(repr: DiffRepr) -> Self {
        Self {
            previous_states: repr.previous.into_iter().map(|e| (e.pos, e.state)).collect(),
            added: repr.added.into_iter().collect(),
            removed: repr.removed.into_iter().collect(),
            modified: repr.modified.into_iter().collect(),
        }
    }
}

impl DiffResult {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }

    pub fn change_count(&self) -> usize {
        self.added.len() + self.removed.len() + self.modified.len()
    }
}

/// Spatial diff between the live world and a recent commit.
///
/// Only positions touched by the target commit are compared, so cost is
/// bounded by that commit's size and never by the radius.
pub struct DiffEngine;

impl DiffEngine {
    /// Diff the live world against the target commit within `radius` of `center`.
    ///
    /// A missing or unreadable store yields an empty result.
    pub fn compute<R: CellReader + ?Sized>(
        store: &CommitStore,
        live: &R,
        center: CellPos,
        radius: u32,
    ) -> DiffResult {
        let commits = match store.list_chronological() {
            Ok(commits) => commits,
            Err(e) => {
                tracing::warn!(error = %e, "cannot list commits for diff");
                return DiffResult::default();
            }
        };
        match Self::target(&commits) {
            Some(target) => Self::compare(target, live, center, radius),
            None => DiffResult::default(),
        }
    }

    /// Second-most-recent commit, or the only one. `commits` is oldest first.
    pub fn target(commits: &[Commit]) -> Option<&Commit> {
        match commits.len() {
            0 => None,
            1 => commits.first(),
            n => commits.get(n - 2),
        }
    }

    /// Diff the live world against the positions `commit` touched.
    pub fn compare<R: CellReader + ?Sized>(
        commit: &Commit,
        live: &R,
        center: CellPos,
        radius: u32,
    ) -> DiffResult {
        let mut result = DiffResult::default();
        for record in commit.changes() {
            let pos = record.position();
            if pos.within_radius(center, radius) {
                let previous = record.new_state().filter(|s| !s.is_empty()).cloned();
                result.previous_states.insert(pos, previous);
            }
        }

        for (pos, previous) in &result.previous_states {
            let now = live.read_cell(*pos).filter(|s| !s.is_empty());
            match (previous, now) {
                (None, Some(_)) => {
                    result.added.insert(*pos);
                }
                (Some(_), None) => {
                    result.removed.insert(*pos);
                }
                (Some(before), Some(now)) if *before != now => {
                    result.modified.insert(*pos);
                }
                _ => {}
            }
        }
        tracing::debug!(
            commit = %commit.short_id(),
            compared = result.previous_states.len(),
            added = result.added.len(),
            removed = result.removed.len(),
            modified = result.modified.len(),
            "computed diff"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxelbase_common::ChangeRecord;
    use voxelbase_kernel::{CellWriter, VoxelWorld};

    fn state(ty: &str) -> CellState {
        CellState::new(ty)
    }

    fn save(store: &CommitStore, message: &str, ts: i64, changes: Vec<ChangeRecord>) -> Commit {
        let parent = store.latest_commit_id().unwrap();
        let commit = Commit::create(message, "t", parent, changes, ts);
        store.save_commit(&commit).unwrap();
        commit
    }

    #[test]
    fn classifies_each_position_once() {
        let origin = CellPos::new(0, 64, 0);
        let a = CellPos::new(1, 64, 0);
        let b = CellPos::new(2, 64, 0);
        let c = CellPos::new(3, 64, 0);
        let d = CellPos::new(4, 64, 0);
        let commit = Commit::create(
            "target",
            "t",
            None,
            vec![
                ChangeRecord::broken(a, state("stone"), 1),
                ChangeRecord::placed(b, state("stone"), 2),
                ChangeRecord::placed(c, state("stone"), 3),
                ChangeRecord::placed(d, state("stone"), 4),
            ],
            10,
        );
        let mut world = VoxelWorld::new();
        world.write_cell(a, Some(state("dirt"))).unwrap();
        world.write_cell(c, Some(state("glass"))).unwrap();
        world.write_cell(d, Some(state("stone"))).unwrap();

        let diff = DiffEngine::compare(&commit, &world, origin, 16);
        assert_eq!(diff.added, BTreeSet::from([a]));
        assert_eq!(diff.removed, BTreeSet::from([b]));
        assert_eq!(diff.modified, BTreeSet::from([c]));
        assert_eq!(diff.previous_states.len(), 4);
        assert_eq!(diff.previous_states[&a], None);
        assert_eq!(diff.change_count(), 3);
        assert!(diff.added.is_disjoint(&diff.removed));
        assert!(diff.added.is_disjoint(&diff.modified));
        assert!(diff.removed.is_disjoint(&diff.modified));
    }

    #[test]
    fn radius_is_inclusive_and_filters() {
        let origin = CellPos::new(0, 0, 0);
        let edge = CellPos::new(5, 0, 0);
        let outside = CellPos::new(6, 0, 0);
        let commit = Commit::create(
            "m",
            "t",
            None,
            vec![
                ChangeRecord::placed(edge, state("stone"), 1),
                ChangeRecord::placed(outside, state("stone"), 2),
            ],
            1,
        );
        let world = VoxelWorld::new();
        let diff = DiffEngine::compare(&commit, &world, origin, 5);
        assert_eq!(diff.removed, BTreeSet::from([edge]));
        assert!(!diff.previous_states.contains_key(&outside));
    }

    #[test]
    fn empty_states_count_as_absent() {
        let pos = CellPos::new(0, 0, 0);
        let commit = Commit::create("m", "t", None, vec![ChangeRecord::placed(pos, state("minecraft:air"), 1)], 1);
        let world = VoxelWorld::new();
        assert!(DiffEngine::compare(&commit, &world, pos, 1).is_empty());
    }

    #[test]
    fn targets_second_most_recent() {
        let dir = tempfile::tempdir().unwrap();
        let store = CommitStore::open(dir.path());
        let pos = CellPos::new(0, 64, 0);
        let world = VoxelWorld::new();

        assert_eq!(DiffEngine::compute(&store, &world, pos, 8), DiffResult::default());
        store.init(None, 0).unwrap();
        assert_eq!(DiffEngine::compute(&store, &world, pos, 8), DiffResult::default());

        save(&store, "first", 1, vec![ChangeRecord::placed(pos, state("stone"), 1)]);
        let only = DiffEngine::compute(&store, &world, pos, 8);
        assert_eq!(only.removed, BTreeSet::from([pos]));

        save(&store, "second", 2, vec![ChangeRecord::broken(pos, state("stone"), 2)]);
        let mut live = VoxelWorld::new();
        live.write_cell(pos, Some(state("stone"))).unwrap();
        let diff = DiffEngine::compute(&store, &live, pos, 8);
        // Target is "first", whose stone matches the live cell.
        assert!(diff.is_empty());
        assert_eq!(diff.previous_states[&pos], Some(state("stone")));
    }
}
