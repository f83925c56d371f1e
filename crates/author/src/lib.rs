//! In-world authoring: capture cell mutations, stage them, commit, and
//! hard-reset back to an earlier commit.
//!
//! # Invariants
//! - The change log is append-only between commits/resets and never loses a
//!   concurrent record.
//! - Staging replaces the whole staged set; it never merges.
//! - A hard reset either fully reverts and prunes, or reports exactly which
//!   commits were undone and keeps the rest.

mod change_log;
pub mod revert;
mod session;
mod staging;

pub use change_log::ChangeLog;
pub use revert::{PartialRevert, PruneFailure, RevertError, RevertSummary, reset_hard};
pub use session::{Session, SessionError};
pub use staging::StagingIndex;
