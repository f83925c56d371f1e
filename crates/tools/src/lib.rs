//! Developer tooling: spatial diff against history, the diff view state
//! machine, and the working-set status inspector.
//!
//! # Invariants
//! - Tools only read the store and the world; they never mutate either.
//! - `added`, `removed` and `modified` of a diff are pairwise disjoint.

pub mod diff;
pub mod inspector;
pub mod view;

pub use diff::{DiffEngine, DiffResult};
pub use inspector::{StatusInspector, StatusReport};
pub use view::{DEFAULT_DIFF_RADIUS, DiffView, ViewMode, ViewState};
