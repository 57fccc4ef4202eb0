//! Self-contained snapshot encoding of a tree and its session

use super::traits::{StorageError, StorageResult, StoredWiki};
use crate::processor::SessionState;
use crate::wiki::KnowledgeTree;
use serde::{Deserialize, Serialize};

pub const SNAPSHOT_FORMAT: u32 = 1;

#[derive(Serialize)]
struct SnapshotRef<'a> {
    format: u32,
    tree: &'a KnowledgeTree,
    session: &'a SessionState,
}

#[derive(Deserialize)]
struct Snapshot {
    format: u32,
    tree: KnowledgeTree,
    session: SessionState,
}

/// Encode a tree and session as a JSON blob.
pub fn to_blob(tree: &KnowledgeTree, session: &SessionState) -> StorageResult<Vec<u8>> {
    let snapshot = SnapshotRef {
        format: SNAPSHOT_FORMAT,
        tree,
        session,
    };
    Ok(serde_json::to_vec_pretty(&snapshot)?)
}

/// Decode a blob written by [`to_blob`].
pub fn from_blob(blob: &[u8]) -> StorageResult<StoredWiki> {
    let snapshot: Snapshot = serde_json::from_slice(blob)?;
    if snapshot.format != SNAPSHOT_FORMAT {
        return Err(StorageError::UnsupportedFormat(snapshot.format));
    }
    Ok((snapshot.tree, snapshot.session))
}
