use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use voxelbase_common::{CellPos, CellState};

/// Lowest buildable Y coordinate of the reference world.
pub const MIN_BUILD_Y: i32 = -64;
/// Highest buildable Y coordinate of the reference world.
pub const MAX_BUILD_Y: i32 = 319;

/// Read access to live cell state.
///
/// `None` means the cell is empty. Implementations may also report an empty
/// state explicitly (e.g. air); consumers treat both the same way.
pub trait CellReader {
    fn read_cell(&self, pos: CellPos) -> Option<CellState>;
}

/// Write access used to restore historical state.
pub trait CellWriter {
    /// Set `pos` to `state`, or clear it when `state` is `None`.
    fn write_cell(&mut self, pos: CellPos, state: Option<CellState>) -> Result<(), WriteError>;
}

/// Errors from live-state writes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WriteError {
    #[error("position {0} is outside the buildable range")]
    OutOfBounds(CellPos),
    #[error("write rejected at {pos}: {reason}")]
    Rejected { pos: CellPos, reason: String },
}

/// An event record produced by every host mutation of the world.
///
/// Events carry the before/after state so the version engine can turn them
/// into change records without re-reading the grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorldEvent {
    CellChanged {
        pos: CellPos,
        old: Option<CellState>,
        new: Option<CellState>,
        tick: u64,
    },
}

/// Reference implementation of the host's mutable cell grid.
///
/// Uses BTreeMap for deterministic iteration order across all platforms.
/// Empty cells are simply absent from the map. Serializes as a flat cell list
/// (JSON object keys must be strings) and never persists the event log.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "WorldRepr", into = "WorldRepr")]
pub struct VoxelWorld {
    cells: BTreeMap<CellPos, CellState>,
    tick: u64,
    /// Append-only event log of host mutations since the last drain.
    event_log: Vec<WorldEvent>,
}

#[derive(Serialize, Deserialize)]
struct WorldRepr {
    tick: u64,
    cells: Vec<CellEntry>,
}

#[derive(Serialize, Deserialize)]
struct CellEntry {
    #[serde(flatten)]
    pos: CellPos,
    state: CellState,
}

impl From<VoxelWorld> for WorldRepr {
    fn from(world: VoxelWorld) -> Self {
        Self {
            tick: world.tick,
            cells: world
                .cells
                .into_iter()
                .map(|(pos, state)| CellEntry { pos, state })
                .collect(),
        }
    }
}

impl From<WorldRepr> for VoxelWorld {
    fn from(repr: WorldRepr) -> Self {
        Self {
            cells: repr.cells.into_iter().map(|e| (e.pos, e.state)).collect(),
            tick: repr.tick,
            event_log: Vec::new(),
        }
    }
}

impl VoxelWorld {
    /// Create an empty world at tick 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current simulation tick.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Advance the simulation clock by one tick.
    pub fn step(&mut self) {
        self.tick += 1;
    }

    /// Number of non-empty cells.
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Read-only access to all non-empty cells.
    pub fn cells(&self) -> &BTreeMap<CellPos, CellState> {
        &self.cells
    }

    pub fn get(&self, pos: CellPos) -> Option<&CellState> {
        self.cells.get(&pos)
    }

    /// Drain and return the event log.
    pub fn drain_events(&mut self) -> Vec<WorldEvent> {
        std::mem::take(&mut self.event_log)
    }

    /// Read-only access to the event log.
    pub fn events(&self) -> &[WorldEvent] {
        &self.event_log
    }

    /// Host mutation: set (or clear) a cell and log the change.
    ///
    /// Returns the previous state. No event is logged when the state does
    /// not actually change.
    pub fn set_cell(
        &mut self,
        pos: CellPos,
        state: Option<CellState>,
    ) -> Result<Option<CellState>, WriteError> {
        check_bounds(pos)?;
        let new = state.filter(|s| !s.is_empty());
        let old = self.apply(pos, new.clone());
        if old != new {
            tracing::debug!(%pos, tick = self.tick, "cell changed");
            self.event_log.push(WorldEvent::CellChanged {
                pos,
                old: old.clone(),
                new,
                tick: self.tick,
            });
        }
        Ok(old)
    }

    /// Place a cell (host mutation).
    pub fn place(&mut self, pos: CellPos, state: CellState) -> Result<Option<CellState>, WriteError> {
        self.set_cell(pos, Some(state))
    }

    /// Break a cell (host mutation).
    pub fn break_cell(&mut self, pos: CellPos) -> Result<Option<CellState>, WriteError> {
        self.set_cell(pos, None)
    }

    fn apply(&mut self, pos: CellPos, state: Option<CellState>) -> Option<CellState> {
        match state {
            Some(s) => self.cells.insert(pos, s),
            None => self.cells.remove(&pos),
        }
    }
}

impl CellReader for VoxelWorld {
    fn read_cell(&self, pos: CellPos) -> Option<CellState> {
        self.cells.get(&pos).cloned()
    }
}

impl CellWriter for VoxelWorld {
    fn write_cell(&mut self, pos: CellPos, state: Option<CellState>) -> Result<(), WriteError> {
        check_bounds(pos)?;
        self.apply(pos, state.filter(|s| !s.is_empty()));
        Ok(())
    }
}

fn check_bounds(pos: CellPos) -> Result<(), WriteError> {
    if (MIN_BUILD_Y..=MAX_BUILD_Y).contains(&pos.y) {
        Ok(())
    } else {
        Err(WriteError::OutOfBounds(pos))
    }
}
