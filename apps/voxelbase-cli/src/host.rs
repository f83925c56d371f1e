//! Files the command line keeps next to the store: the simulated world grid
//! and the diff view state.

use anyhow::Context;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use voxelbase_kernel::VoxelWorld;
use voxelbase_persist::DATA_DIR;
use voxelbase_tools::ViewState;

pub const WORLD_FILE: &str = "world.json";
pub const VIEW_FILE: &str = "view.json";

pub fn world_path(root: &Path) -> PathBuf {
    root.join(WORLD_FILE)
}

pub fn view_path(root: &Path) -> PathBuf {
    root.join(DATA_DIR).join(VIEW_FILE)
}

/// The world saved under `root`, or an empty one.
pub fn load_world(root: &Path) -> anyhow::Result<VoxelWorld> {
    Ok(read_json(&world_path(root))?.unwrap_or_default())
}

pub fn save_world(root: &Path, world: &VoxelWorld) -> anyhow::Result<()> {
    write_json(&world_path(root), world)
}

pub fn load_view(root: &Path) -> anyhow::Result<ViewState> {
    Ok(read_json(&view_path(root))?.unwrap_or_default())
}

pub fn save_view(root: &Path, state: &ViewState) -> anyhow::Result<()> {
    write_json(&view_path(root), state)
}

pub fn clear_view(root: &Path) -> anyhow::Result<()> {
    match fs::remove_file(view_path(root)) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Option<T>> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("cannot read {}", path.display())),
    };
    let value = serde_json::from_str(&text).with_context(|| format!("invalid JSON in {}", path.display()))?;
    Ok(Some(value))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut tmp, value)?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .with_context(|| format!("cannot write {}", path.display()))?;
    Ok(())
}
