use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use voxelbase_common::{CellPos, CellState, ChangeRecord};

/// Append-only log of observed cell mutations since the last commit or reset.
///
/// Safe to share across threads. Readers take a cheap `Arc` snapshot; a
/// writer only copies the backing vector when a snapshot is still alive.
#[derive(Debug)]
pub struct ChangeLog {
    entries: RwLock<Arc<Vec<ChangeRecord>>>,
    enabled: AtomicBool,
}

impl Default for ChangeLog {
    fn default() -> Self {
        Self {
            entries: RwLock::new(Arc::new(Vec::new())),
            enabled: AtomicBool::new(true),
        }
    }
}

impl ChangeLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a log from persisted records (e.g. a reloaded working set).
    pub fn from_records(records: Vec<ChangeRecord>) -> Self {
        Self {
            entries: RwLock::new(Arc::new(records)),
            enabled: AtomicBool::new(true),
        }
    }

    /// Record one mutation. Ignored while disabled, and for no-op mutations
    /// (both states absent, or old equal to new).
    pub fn record(
        &self,
        position: CellPos,
        old_state: Option<CellState>,
        new_state: Option<CellState>,
        clock: i64,
    ) {
        if !self.is_enabled() {
            return;
        }
        if old_state == new_state {
            tracing::trace!(%position, "ignoring no-op mutation");
            return;
        }
        match ChangeRecord::new(position, old_state, new_state, clock) {
            Ok(record) => self.push(record),
            Err(e) => tracing::debug!(error = %e, "ignoring mutation"),
        }
    }

    /// Append an already-built record.
    pub fn push(&self, record: ChangeRecord) {
        if !self.is_enabled() {
            return;
        }
        let mut guard = self.entries.write();
        Arc::make_mut(&mut guard).push(record);
    }

    /// Consistent point-in-time view. Later records never show up in it.
    pub fn snapshot(&self) -> Arc<Vec<ChangeRecord>> {
        Arc::clone(&self.entries.read())
    }

    pub fn clear(&self) {
        *self.entries.write() = Arc::new(Vec::new());
    }

    pub fn count(&self) -> usize {
        self.entries.read().len()
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn stone() -> CellState {
        CellState::new("minecraft:stone")
    }

    #[test]
    fn records_kinds() {
        let log = ChangeLog::new();
        log.record(CellPos::new(0, 64, 0), None, Some(stone()), 1);
        let snap = log.snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].kind(), voxelbase_common::ChangeKind::Placed);
        assert_eq!(snap[0].old_state(), None);
        assert_eq!(snap[0].new_state(), Some(&stone()));
    }

    #[test]
    fn no_op_mutations_are_ignored() {
        let log = ChangeLog::new();
        log.record(CellPos::new(0, 0, 0), None, None, 1);
        log.record(CellPos::new(0, 0, 0), Some(stone()), Some(stone()), 2);
        assert_eq!(log.count(), 0);
    }

    #[test]
    fn snapshot_is_isolated_from_later_writes() {
        let log = ChangeLog::new();
        log.record(CellPos::new(1, 1, 1), None, Some(stone()), 1);
        let snap = log.snapshot();
        log.record(CellPos::new(2, 2, 2), None, Some(stone()), 2);
        log.clear();
        assert_eq!(snap.len(), 1);
        assert_eq!(log.count(), 0);
    }

    #[test]
    fn disabling_keeps_existing_entries() {
        let log = ChangeLog::new();
        log.record(CellPos::new(1, 1, 1), None, Some(stone()), 1);
        log.set_enabled(false);
        log.record(CellPos::new(2, 2, 2), None, Some(stone()), 2);
        assert_eq!(log.count(), 1);
        log.set_enabled(true);
        log.record(CellPos::new(3, 3, 3), None, Some(stone()), 3);
        assert_eq!(log.count(), 2);
    }

    #[test]
    fn concurrent_writers_lose_nothing() {
        let log = Arc::new(ChangeLog::new());
        let writers: Vec<_> = (0..8)
            .map(|t| {
                let log = Arc::clone(&log);
                thread::spawn(move || {
                    for i in 0..250 {
                        log.record(CellPos::new(t, i, 0), None, Some(stone()), i as i64);
                        if i % 50 == 0 {
                            let _ = log.snapshot();
                        }
                    }
                })
            })
            .collect();
        for w in writers {
            w.join().unwrap();
        }
        let snap = log.snapshot();
        assert_eq!(snap.len(), 2000);
        // Per-writer append order survives.
        for t in 0..8 {
            let ys: Vec<i32> = snap
                .iter()
                .filter(|r| r.position().x == t)
                .map(|r| r.position().y)
                .collect();
            assert_eq!(ys, (0..250).collect::<Vec<_>>());
        }
    }
}
