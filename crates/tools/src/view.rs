//! Diff view state machine.
//!
//! ```text
//! OFF --cycle--> DIFF --cycle--> CURRENT --cycle--> PREVIOUS --cycle--> DIFF
//!  ^                                                                    |
//!  +------------------------------ exit (from any state) ---------------+
//! ```
//!
//! Only `OFF -> DIFF` computes a diff; the other transitions reuse the cache.

use crate::diff::{DiffEngine, DiffResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use voxelbase_common::{CellPos, CellState};
use voxelbase_kernel::CellReader;
use voxelbase_persist::CommitStore;

pub const DEFAULT_DIFF_RADIUS: u32 = 256;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViewMode {
    #[default]
    Off,
    Diff,
    Current,
    Previous,
}

impl ViewMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::Diff => "DIFF",
            Self::Current => "CURRENT",
            Self::Previous => "PREVIOUS",
        }
    }
}

impl fmt::Display for ViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A view as saved between processes, cached result included.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewState {
    pub mode: ViewMode,
    pub anchor: Option<CellPos>,
    pub radius: Option<u32>,
    #[serde(default)]
    pub result: DiffResult,
}

#[derive(Debug, Clone)]
pub struct DiffView {
    mode: ViewMode,
    anchor: Option<CellPos>,
    radius: u32,
    cached: DiffResult,
}

impl Default for DiffView {
    fn default() -> Self {
        Self::new()
    }
}

impl DiffView {
    pub fn new() -> Self {
        Self::with_radius(DEFAULT_DIFF_RADIUS)
    }

    pub fn with_radius(radius: u32) -> Self {
        Self {
            mode: ViewMode::Off,
            anchor: None,
            radius,
            cached: DiffResult::default(),
        }
    }

    /// Rebuild a view from saved state. The saved result is reused as is;
    /// only leaving `OFF` computes a diff.
    pub fn resume(state: ViewState, default_radius: u32) -> Self {
        let mut view = Self::with_radius(state.radius.unwrap_or(default_radius));
        if let Some(anchor) = state.anchor.filter(|_| state.mode != ViewMode::Off) {
            view.mode = state.mode;
            view.anchor = Some(anchor);
            view.cached = state.result;
        }
        view
    }

    pub fn state(&self) -> ViewState {
        ViewState {
            mode: self.mode,
            anchor: self.anchor,
            radius: Some(self.radius),
            result: self.cached.clone(),
        }
    }

    /// Advance to the next mode. Leaving `OFF` anchors the view at
    /// `position` and computes the diff.
    pub fn cycle<R: CellReader + ?Sized>(
        &mut self,
        store: &CommitStore,
        live: &R,
        position: CellPos,
    ) -> ViewMode {
        self.mode = match self.mode {
            ViewMode::Off => {
                self.anchor = Some(position);
                self.cached = DiffEngine::compute(store, live, position, self.radius);
                ViewMode::Diff
            }
            ViewMode::Diff => ViewMode::Current,
            ViewMode::Current => ViewMode::Previous,
            ViewMode::Previous => ViewMode::Diff,
        };
        tracing::debug!(mode = %self.mode, "diff view cycled");
        self.mode
    }

    /// Back to `OFF`; drops the cached result and anchor.
    pub fn exit(&mut self) {
        self.mode = ViewMode::Off;
        self.anchor = None;
        self.cached = DiffResult::default();
    }

    pub fn mode(&self) -> ViewMode {
        self.mode
    }

    pub fn anchor(&self) -> Option<CellPos> {
        self.anchor
    }

    pub fn radius(&self) -> u32 {
        self.radius
    }

    pub fn result(&self) -> &DiffResult {
        &self.cached
    }

    pub fn added(&self) -> &BTreeSet<CellPos> {
        &self.cached.added
    }

    pub fn removed(&self) -> &BTreeSet<CellPos> {
        &self.cached.removed
    }

    pub fn modified(&self) -> &BTreeSet<CellPos> {
        &self.cached.modified
    }

    pub fn previous_states(&self) -> &BTreeMap<CellPos, Option<CellState>> {
        &self.cached.previous_states
    }
}
