//! Shared types for the voxelbase engine: cell addresses, cell states and the
//! change records every other crate passes around.

pub mod types;

pub use types::{CellPos, CellState, ChangeKind, ChangeRecord, InvalidChange, short_id};
