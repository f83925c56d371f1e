//! Settings: built-in defaults, then `.vcsdata/config.toml`, then env/flags.
//!
//! ```toml
//! author = "Alice"
//! diff_radius = 64
//! api_url = "https://example.test/api"
//! ```

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use voxelbase_persist::DATA_DIR;
use voxelbase_tools::DEFAULT_DIFF_RADIUS;

pub const CONFIG_FILE: &str = "config.toml";
pub const DEFAULT_AUTHOR: &str = "voxelbase";

/// Contents of `.vcsdata/config.toml`. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub author: Option<String>,
    pub diff_radius: Option<u32>,
    pub api_url: Option<String>,
}

impl FileConfig {
    pub fn path(root: &Path) -> PathBuf {
        root.join(DATA_DIR).join(CONFIG_FILE)
    }

    /// Read the config file under `root`; a missing file is an empty config.
    pub fn load(root: &Path) -> anyhow::Result<Self> {
        let path = Self::path(root);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(e).with_context(|| format!("cannot read {}", path.display()));
            }
        };
        toml::from_str(&contents).with_context(|| format!("invalid config at {}", path.display()))
    }
}

/// Values supplied on the command line or through the environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub author: Option<String>,
    pub diff_radius: Option<u32>,
    pub api_url: Option<String>,
    pub api_key: Option<String>,
}

/// Effective settings for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub author: String,
    pub diff_radius: u32,
    /// Explicit API base; when absent the repository's remote is used.
    pub api_url: Option<String>,
    pub api_key: Option<String>,
}

impl Settings {
    pub fn resolve(file: FileConfig, overrides: Overrides) -> Self {
        let non_blank = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        Self {
            author: non_blank(overrides.author)
                .or(non_blank(file.author))
                .unwrap_or_else(|| DEFAULT_AUTHOR.to_string()),
            diff_radius: overrides
                .diff_radius
                .or(file.diff_radius)
                .unwrap_or(DEFAULT_DIFF_RADIUS),
            api_url: non_blank(overrides.api_url).or(non_blank(file.api_url)),
            api_key: non_blank(overrides.api_key),
        }
    }
}
