//! Storage trait definitions

use crate::processor::SessionState;
use crate::wiki::KnowledgeTree;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Wiki not found: {0}")]
    WikiNotFound(String),

    #[error("Unsupported snapshot format version {0}")]
    UnsupportedFormat(u32),

    #[error("Date parsing error: {0}")]
    DateParse(String),

    #[error("Corrupt store: {0}")]
    Corrupt(String),

    #[error("Store lock poisoned")]
    LockPoisoned,
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// A stored wiki: the tree and the session that built it.
pub type StoredWiki = (KnowledgeTree, SessionState);

/// Trait for wiki storage backends
///
/// Saves are whole snapshots keyed by tree name. A save replaces whatever
/// was stored under that name.
pub trait WikiStore: Send + Sync {
    /// Save a tree and its session, replacing any previous snapshot
    fn save(&self, tree: &KnowledgeTree, session: &SessionState) -> StorageResult<()>;

    /// Load a wiki by name
    fn load(&self, name: &str) -> StorageResult<Option<StoredWiki>>;

    /// Delete a wiki; returns whether it existed
    fn delete(&self, name: &str) -> StorageResult<bool>;

    /// Names of all stored wikis
    fn list(&self) -> StorageResult<Vec<String>>;
}

/// Trait for stores that can be opened from a path
pub trait OpenStore: WikiStore + Sized {
    /// Open or create a store at the given path
    fn open(path: impl AsRef<Path>) -> StorageResult<Self>;

    /// Create an in-memory store (useful for testing)
    fn open_in_memory() -> StorageResult<Self>;
}
