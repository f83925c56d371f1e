//! Persistence: content-hashed commits, repository metadata, and the
//! file-backed commit store under `.vcsdata/`.
//!
//! # Invariants
//! - A commit file is never overwritten; writes land via temp file + rename.
//! - Every loaded commit's id matches a recomputation over its fields.
//! - Commit order follows the parent chain from `HEAD`, falling back to
//!   file modification time when the chain is missing or incomplete.

pub mod commit;
pub mod repository;
pub mod store;

pub use commit::{ChangeWire, Commit, CommitParseError};
pub use repository::{DEFAULT_BRANCH, DEFAULT_NAME, Repository};
pub use store::{CommitStore, DATA_DIR, StoreError};
