//! Repository metadata (`repo.json`).

use serde::{Deserialize, Serialize};

pub const DEFAULT_BRANCH: &str = "main";
pub const DEFAULT_NAME: &str = "Voxelbase Repository";

/// Identity and remote binding of a local repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    pub id: String,
    pub name: String,
    pub default_branch: String,
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_repo_id: Option<String>,
}

impl Repository {
    /// A fresh repository with a random v4 id on the default branch.
    pub fn new(name: impl Into<String>, created_at: i64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            default_branch: DEFAULT_BRANCH.to_string(),
            created_at,
            remote_url: None,
            remote_repo_id: None,
        }
    }

    /// Copy of this repository bound to a remote.
    pub fn with_remote(&self, url: impl Into<String>, remote_repo_id: Option<String>) -> Self {
        Self {
            remote_url: Some(url.into()),
            remote_repo_id,
            ..self.clone()
        }
    }

    /// Id used on the remote side: the bound remote id, else the local id.
    pub fn push_target_id(&self) -> &str {
        self.remote_repo_id.as_deref().unwrap_or(&self.id)
    }
}
