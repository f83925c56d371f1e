//! Remote sync collaborator for the voxelbase backend.
//!
//! # Invariants
//! - Remote calls never touch the local store; a failed push leaves every
//!   commit in place.
//! - Each commit is pushed on its own. Failures are counted and reported,
//!   never retried, and never abort the rest of the batch.

pub mod client;
pub mod push;
pub mod wire;

pub use client::{DEFAULT_API_URL, HttpRemote, RemoteClient, RemoteConfig, RemoteError, RemoteTarget};
pub use push::{PushFailure, PushReport, create_remote_repository, push_all};
pub use wire::{ChangePayload, CommitPayload, RemoteCommit, RemoteRepository, RepositoryPayload};
