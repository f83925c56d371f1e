use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Type ids that count as "nothing here" when comparing snapshots.
const EMPTY_TYPE_IDS: &[&str] = &["air", "minecraft:air", "minecraft:cave_air", "minecraft:void_air"];

/// Length of the abbreviated commit id shown to users.
pub const SHORT_ID_LEN: usize = 7;

/// Integer address of a single cell in the voxel grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl CellPos {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Squared Euclidean distance, widened so extreme coordinates cannot overflow.
    pub fn distance_squared(self, other: CellPos) -> i128 {
        let dx = i128::from(self.x) - i128::from(other.x);
        let dy = i128::from(self.y) - i128::from(other.y);
        let dz = i128::from(self.z) - i128::from(other.z);
        dx * dx + dy * dy + dz * dz
    }

    /// Inclusive Euclidean radius check.
    pub fn within_radius(self, center: CellPos, radius: u32) -> bool {
        let r = i128::from(radius);
        self.distance_squared(center) <= r * r
    }
}

impl fmt::Display for CellPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Configuration of one cell: a type identifier plus its property mapping.
///
/// Two states are equal iff the type id and the full property map match.
/// Properties live in a `BTreeMap` so iteration (and therefore hashing and
/// serialization) is canonical.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellState {
    pub type_id: String,
    pub properties: BTreeMap<String, String>,
}

impl CellState {
    /// A state with the given type and no properties.
    pub fn new(type_id: impl Into<String>) -> Self {
        Self {
            type_id: type_id.into(),
            properties: BTreeMap::new(),
        }
    }

    /// Builder-style property insert. Re-inserting a key replaces its value.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Whether this state represents an empty cell (air or a blank type id).
    pub fn is_empty(&self) -> bool {
        self.type_id.is_empty() || EMPTY_TYPE_IDS.contains(&self.type_id.as_str())
    }
}

impl fmt::Display for CellState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.type_id)?;
        if !self.properties.is_empty() {
            let props: Vec<String> = self
                .properties
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            write!(f, "[{}]", props.join(","))?;
        }
        Ok(())
    }
}

/// Derived classification of a change record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeKind {
    /// Nothing was there before.
    Placed,
    /// Nothing is there now.
    Broken,
    /// Both states exist.
    Modified,
}

impl ChangeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Placed => "PLACED",
            Self::Broken => "BROKEN",
            Self::Modified => "MODIFIED",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record with neither a before nor an after state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("change at {0} has neither an old nor a new state")]
pub struct InvalidChange(pub CellPos);

/// One observed mutation of a single cell.
///
/// Immutable once built. The constructor enforces that `old_state` and
/// `new_state` are never both absent, so every record has a well-defined kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRecord {
    position: CellPos,
    old_state: Option<CellState>,
    new_state: Option<CellState>,
    timestamp: i64,
}

impl ChangeRecord {
    pub fn new(
        position: CellPos,
        old_state: Option<CellState>,
        new_state: Option<CellState>,
        timestamp: i64,
    ) -> Result<Self, InvalidChange> {
        if old_state.is_none() && new_state.is_none() {
            return Err(InvalidChange(position));
        }
        Ok(Self {
            position,
            old_state,
            new_state,
            timestamp,
        })
    }

    /// A cell appeared where there was nothing.
    pub fn placed(position: CellPos, new_state: CellState, timestamp: i64) -> Self {
        Self {
            position,
            old_state: None,
            new_state: Some(new_state),
            timestamp,
        }
    }

    /// A cell was removed.
    pub fn broken(position: CellPos, old_state: CellState, timestamp: i64) -> Self {
        Self {
            position,
            old_state: Some(old_state),
            new_state: None,
            timestamp,
        }
    }

    /// A cell changed from one state to another.
    pub fn modified(position: CellPos, old_state: CellState, new_state: CellState, timestamp: i64) -> Self {
        Self {
            position,
            old_state: Some(old_state),
            new_state: Some(new_state),
            timestamp,
        }
    }

    pub fn position(&self) -> CellPos {
        self.position
    }

    pub fn old_state(&self) -> Option<&CellState> {
        self.old_state.as_ref()
    }

    pub fn new_state(&self) -> Option<&CellState> {
        self.new_state.as_ref()
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn kind(&self) -> ChangeKind {
        match (&self.old_state, &self.new_state) {
            (None, _) => ChangeKind::Placed,
            (Some(_), None) => ChangeKind::Broken,
            (Some(_), Some(_)) => ChangeKind::Modified,
        }
    }

    /// The state that best describes this record for summaries: the new
    /// state when present, otherwise the old one.
    pub fn summary_state(&self) -> Option<&CellState> {
        self.new_state.as_ref().or(self.old_state.as_ref())
    }
}

/// Abbreviated form of a commit id for display.
pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(SHORT_ID_LEN) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}
