use parking_lot::RwLock;
use std::sync::Arc;
use voxelbase_common::ChangeRecord;

/// The records selected for the next commit.
///
/// `stage_all` replaces the whole set; it never merges.
#[derive(Debug, Default)]
pub struct StagingIndex {
    staged: RwLock<Arc<Vec<ChangeRecord>>>,
}

impl StagingIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage_all(&self, records: impl IntoIterator<Item = ChangeRecord>) {
        let staged: Vec<ChangeRecord> = records.into_iter().collect();
        tracing::debug!(count = staged.len(), "staged changes");
        *self.staged.write() = Arc::new(staged);
    }

    pub fn clear(&self) {
        *self.staged.write() = Arc::new(Vec::new());
    }

    pub fn snapshot(&self) -> Arc<Vec<ChangeRecord>> {
        Arc::clone(&self.staged.read())
    }

    pub fn count(&self) -> usize {
        self.staged.read().len()
    }
}
