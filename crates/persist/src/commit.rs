//! Commit model: immutable batches of change records with a content hash.
//!
//! The id is a SHA-256 digest over a length-prefixed canonical encoding of
//! every field (message, author, timestamp, parent, and each change in staged
//! order). The timestamp is part of the input, so identical change sets
//! committed at different times get different ids.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use voxelbase_common::{CellPos, CellState, ChangeKind, ChangeRecord, InvalidChange};

/// Errors from decoding a persisted commit or change record.
#[derive(Debug, thiserror::Error)]
pub enum CommitParseError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("change #{index}: {source}")]
    InvalidChange {
        index: usize,
        #[source]
        source: InvalidChange,
    },
    #[error("change #{index}: stored type {stored} does not match derived type {derived}")]
    KindMismatch {
        index: usize,
        stored: ChangeKind,
        derived: ChangeKind,
    },
    #[error("change #{index}: properties present without a state id")]
    OrphanProperties { index: usize },
    #[error("commit id is empty")]
    EmptyId,
}

/// An immutable, content-identified batch of change records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    id: String,
    message: String,
    author: String,
    timestamp: i64,
    parent_id: Option<String>,
    changes: Vec<ChangeRecord>,
}

impl Commit {
    /// Freeze `changes` into a new commit created at `clock_now` (ms since epoch).
    pub fn create(
        message: impl Into<String>,
        author: impl Into<String>,
        parent_id: Option<String>,
        changes: Vec<ChangeRecord>,
        clock_now: i64,
    ) -> Self {
        let message = message.into();
        let author = author.into();
        let id = compute_id(&message, &author, clock_now, parent_id.as_deref(), &changes);
        Self {
            id,
            message,
            author,
            timestamp: clock_now,
            parent_id,
            changes,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn short_id(&self) -> &str {
        voxelbase_common::short_id(&self.id)
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.parent_id.as_deref()
    }

    pub fn changes(&self) -> &[ChangeRecord] {
        &self.changes
    }

    /// Recompute the id from the commit's fields and compare.
    pub fn verify(&self) -> bool {
        compute_id(
            &self.message,
            &self.author,
            self.timestamp,
            self.parent_id.as_deref(),
            &self.changes,
        ) == self.id
    }

    /// Canonical text form, as written to `commits/<id>.json`.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&CommitFile::from(self))
    }

    /// Parse the text form produced by [`Commit::to_json`].
    ///
    /// The id is taken as stored; use [`Commit::verify`] to check it.
    pub fn from_json(text: &str) -> Result<Self, CommitParseError> {
        let file: CommitFile = serde_json::from_str(text)?;
        if file.id.is_empty() {
            return Err(CommitParseError::EmptyId);
        }
        Ok(Self {
            id: file.id,
            message: file.message,
            author: file.author,
            timestamp: file.timestamp,
            parent_id: file.parent_id,
            changes: decode_changes(file.changes)?,
        })
    }
}

/// On-disk schema of a commit file.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommitFile {
    id: String,
    message: String,
    author: String,
    timestamp: i64,
    parent_id: Option<String>,
    changes: Vec<ChangeWire>,
}

impl From<&Commit> for CommitFile {
    fn from(commit: &Commit) -> Self {
        Self {
            id: commit.id.clone(),
            message: commit.message.clone(),
            author: commit.author.clone(),
            timestamp: commit.timestamp,
            parent_id: commit.parent_id.clone(),
            changes: commit.changes.iter().map(ChangeWire::from).collect(),
        }
    }
}

/// On-disk schema of one change record. Shared by commit files and the
/// working-set files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeWire {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub old_state_id: Option<String>,
    pub old_props: Option<BTreeMap<String, String>>,
    pub new_state_id: Option<String>,
    pub new_props: Option<BTreeMap<String, String>>,
    pub timestamp: i64,
    #[serde(rename = "type")]
    pub kind: ChangeKind,
}

impl From<&ChangeRecord> for ChangeWire {
    fn from(rec: &ChangeRecord) -> Self {
        let pos = rec.position();
        Self {
            x: pos.x,
            y: pos.y,
            z: pos.z,
            old_state_id: rec.old_state().map(|s| s.type_id.clone()),
            old_props: rec.old_state().map(|s| s.properties.clone()),
            new_state_id: rec.new_state().map(|s| s.type_id.clone()),
            new_props: rec.new_state().map(|s| s.properties.clone()),
            timestamp: rec.timestamp(),
            kind: rec.kind(),
        }
    }
}

impl ChangeWire {
    /// Convert back into a validated record. `index` is used for error reporting.
    pub fn into_record(self, index: usize) -> Result<ChangeRecord, CommitParseError> {
        let old = join_state(self.old_state_id, self.old_props)
            .ok_or(CommitParseError::OrphanProperties { index })?;
        let new = join_state(self.new_state_id, self.new_props)
            .ok_or(CommitParseError::OrphanProperties { index })?;
        let record = ChangeRecord::new(CellPos::new(self.x, self.y, self.z), old, new, self.timestamp)
            .map_err(|source| CommitParseError::InvalidChange { index, source })?;
        if record.kind() != self.kind {
            return Err(CommitParseError::KindMismatch {
                index,
                stored: self.kind,
                derived: record.kind(),
            });
        }
        Ok(record)
    }
}

/// `None` when properties exist without a type id; `Some(None)` for an absent state.
fn join_state(
    type_id: Option<String>,
    props: Option<BTreeMap<String, String>>,
) -> Option<Option<CellState>> {
    match (type_id, props) {
        (Some(type_id), props) => Some(Some(CellState {
            type_id,
            properties: props.unwrap_or_default(),
        })),
        (None, Some(props)) if !props.is_empty() => None,
        (None, _) => Some(None),
    }
}

fn decode_changes(wires: Vec<ChangeWire>) -> Result<Vec<ChangeRecord>, CommitParseError> {
    wires
        .into_iter()
        .enumerate()
        .map(|(index, wire)| wire.into_record(index))
        .collect()
}

/// Deterministic commit id over every field, changes in their staged order.
pub fn compute_id(
    message: &str,
    author: &str,
    timestamp: i64,
    parent_id: Option<&str>,
    changes: &[ChangeRecord],
) -> String {
    let mut hasher = Sha256::new();
    update_str(&mut hasher, message);
    update_str(&mut hasher, author);
    hasher.update(timestamp.to_le_bytes());
    match parent_id {
        Some(parent) => {
            hasher.update([1]);
            update_str(&mut hasher, parent);
        }
        None => hasher.update([0]),
    }
    hasher.update((changes.len() as u64).to_le_bytes());
    for change in changes {
        let pos = change.position();
        hasher.update(pos.x.to_le_bytes());
        hasher.update(pos.y.to_le_bytes());
        hasher.update(pos.z.to_le_bytes());
        update_state(&mut hasher, change.old_state());
        update_state(&mut hasher, change.new_state());
        hasher.update(change.timestamp().to_le_bytes());
        update_str(&mut hasher, change.kind().as_str());
    }
    format!("{:x}", hasher.finalize())
}

fn update_str(hasher: &mut Sha256, value: &str) {
    hasher.update((value.len() as u64).to_le_bytes());
    hasher.update(value.as_bytes());
}

fn update_state(hasher: &mut Sha256, state: Option<&CellState>) {
    let Some(state) = state else {
        hasher.update([0]);
        return;
    };
    hasher.update([1]);
    update_str(hasher, &state.type_id);
    hasher.update((state.properties.len() as u64).to_le_bytes());
    for (key, value) in &state.properties {
        update_str(hasher, key);
        update_str(hasher, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stone() -> CellState {
        CellState::new("minecraft:stone")
    }

    fn sample_changes() -> Vec<ChangeRecord> {
        let pos = CellPos::new(0, 64, 0);
        vec![
            ChangeRecord::placed(pos, stone(), 100),
            ChangeRecord::modified(
                pos,
                stone(),
                CellState::new("minecraft:furnace")
                    .with_property("facing", "north")
                    .with_property("lit", "false"),
                101,
            ),
            ChangeRecord::broken(CellPos::new(-5, 3, 12), CellState::new("minecraft:dirt"), 102),
        ]
    }

    #[test]
    fn id_is_deterministic() {
        let a = Commit::create("first", "Alice", None, sample_changes(), 1_700_000_000_000);
        let b = Commit::create("first", "Alice", None, sample_changes(), 1_700_000_000_000);
        assert_eq!(a.id(), b.id());
        assert_eq!(a.id().len(), 64);
        assert!(a.verify());
    }

    #[test]
    fn id_covers_every_field() {
        let base = Commit::create("m", "a", None, sample_changes(), 1);
        assert_ne!(base.id(), Commit::create("m2", "a", None, sample_changes(), 1).id());
        assert_ne!(base.id(), Commit::create("m", "b", None, sample_changes(), 1).id());
        assert_ne!(base.id(), Commit::create("m", "a", None, sample_changes(), 2).id());
        assert_ne!(
            base.id(),
            Commit::create("m", "a", Some("p".into()), sample_changes(), 1).id()
        );
        let mut reordered = sample_changes();
        reordered.swap(0, 2);
        assert_ne!(base.id(), Commit::create("m", "a", None, reordered, 1).id());
    }

    #[test]
    fn field_boundaries_are_unambiguous() {
        let a = Commit::create("ab", "c", None, Vec::new(), 0);
        let b = Commit::create("a", "bc", None, Vec::new(), 0);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn json_roundtrip_preserves_everything() {
        let commit = Commit::create(
            "say \"hi\"\n\ttabbed \\ back ünïcødé ✓",
            "Zoë \"the builder\"",
            Some("abc123".into()),
            sample_changes(),
            42,
        );
        let text = commit.to_json().unwrap();
        let parsed = Commit::from_json(&text).unwrap();
        assert_eq!(parsed, commit);
        assert!(parsed.verify());
    }

    #[test]
    fn json_layout_matches_schema() {
        let commit = Commit::create("first", "Alice", None, sample_changes()[..1].to_vec(), 7);
        let value: serde_json::Value = serde_json::from_str(&commit.to_json().unwrap()).unwrap();
        assert_eq!(value["parentId"], serde_json::Value::Null);
        let change = &value["changes"][0];
        assert_eq!(change["x"], 0);
        assert_eq!(change["y"], 64);
        assert_eq!(change["oldStateId"], serde_json::Value::Null);
        assert_eq!(change["newStateId"], "minecraft:stone");
        assert_eq!(change["type"], "PLACED");
    }

    #[test]
    fn truncated_input_is_a_parse_error() {
        let text = Commit::create("m", "a", None, sample_changes(), 1)
            .to_json()
            .unwrap();
        let cut = &text[..text.len() / 2];
        assert!(matches!(Commit::from_json(cut), Err(CommitParseError::Json(_))));
    }

    #[test]
    fn record_without_states_is_rejected() {
        let text = r#"{"id":"x","message":"m","author":"a","timestamp":1,"parentId":null,
            "changes":[{"x":0,"y":0,"z":0,"oldStateId":null,"oldProps":null,
            "newStateId":null,"newProps":null,"timestamp":1,"type":"PLACED"}]}"#;
        assert!(matches!(
            Commit::from_json(text),
            Err(CommitParseError::InvalidChange { index: 0, .. })
        ));
    }

    #[test]
    fn stored_kind_must_match() {
        let text = r#"{"id":"x","message":"m","author":"a","timestamp":1,"parentId":null,
            "changes":[{"x":0,"y":0,"z":0,"oldStateId":null,"oldProps":null,
            "newStateId":"minecraft:stone","newProps":{},"timestamp":1,"type":"BROKEN"}]}"#;
        assert!(matches!(
            Commit::from_json(text),
            Err(CommitParseError::KindMismatch { .. })
        ));
    }

    #[test]
    fn missing_parent_field_reads_as_none() {
        let text = r#"{"id":"x","message":"m","author":"a","timestamp":1,"changes":[]}"#;
        let commit = Commit::from_json(text).unwrap();
        assert_eq!(commit.parent_id(), None);
        assert!(commit.changes().is_empty());
    }
}
