//! World Kernel: the live cell grid the version engine observes and restores.
//!
//! # Invariants
//! - Host mutations flow through `VoxelWorld::set_cell` and are logged as events.
//! - Restore writes (`CellWriter::write_cell`) are never logged, so a revert is
//!   not mistaken for a new change.

pub mod world;

pub use world::{CellReader, CellWriter, VoxelWorld, WorldEvent, WriteError};
