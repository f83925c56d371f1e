//! JSON bodies exchanged with the backend.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use voxelbase_common::ChangeRecord;
use voxelbase_persist::{Commit, Repository};

/// Body of `POST /repos`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryPayload {
    pub id: String,
    pub name: String,
    pub default_branch: String,
}

impl RepositoryPayload {
    /// Payload announcing `repo` under `remote_id`.
    pub fn for_repository(repo: &Repository, remote_id: &str) -> Self {
        Self {
            id: remote_id.to_string(),
            name: repo.name.clone(),
            default_branch: repo.default_branch.clone(),
        }
    }
}

/// Response of `GET /repos/:id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRepository {
    pub id: String,
    pub name: String,
    pub default_branch: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangePayload {
    pub pos_x: i32,
    pub pos_y: i32,
    pub pos_z: i32,
    pub old_state: Option<String>,
    pub new_state: Option<String>,
}

impl From<&ChangeRecord> for ChangePayload {
    fn from(record: &ChangeRecord) -> Self {
        let pos = record.position();
        Self {
            pos_x: pos.x,
            pos_y: pos.y,
            pos_z: pos.z,
            old_state: record.old_state().map(|s| s.type_id.clone()),
            new_state: record.new_state().map(|s| s.type_id.clone()),
        }
    }
}

/// Body of `POST /repos/:id/commits`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitPayload {
    pub id: String,
    pub message: String,
    pub author: String,
    /// RFC 3339 with millisecond precision.
    pub timestamp: String,
    pub changes: Vec<ChangePayload>,
}

impl From<&Commit> for CommitPayload {
    fn from(commit: &Commit) -> Self {
        Self {
            id: commit.id().to_string(),
            message: commit.message().to_string(),
            author: commit.author().to_string(),
            timestamp: rfc3339_millis(commit.timestamp()),
            changes: commit.changes().iter().map(ChangePayload::from).collect(),
        }
    }
}

/// Response item of `GET /repos/:id/commits`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteCommit {
    pub id: String,
    pub repo_id: String,
    pub message: String,
    pub author: String,
    pub timestamp: String,
}

/// Format epoch milliseconds; out-of-range values fall back to now.
fn rfc3339_millis(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .unwrap_or_else(Utc::now)
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}
