//! Lorebook: incremental wiki building from long texts
//!
//! Source books are cut into chunks. For each chunk a text-generation
//! agent extracts facts as typed operations against a knowledge tree;
//! the facts accumulate in per-attribute buffers and are consolidated
//! into canonical values once enough have arrived. A rolling summary of
//! earlier chunks keeps each extraction consistent with the last.
//!
//! # Core Concepts
//!
//! - **Knowledge tree**: sections of entities of attributes
//! - **Buffers**: raw fragments waiting to be folded into an attribute
//! - **Running context**: bounded window of recent chunk summaries
//! - **Session**: cursor and context that make a build resumable
//!
//! # Example
//!
//! ```
//! use lorebook::{AttributePath, KnowledgeTree, Section, SectionKind};
//!
//! let mut tree = KnowledgeTree::new("lotm")
//!     .with_section(Section::new("Characters", SectionKind::Characters))
//!     .unwrap();
//! let path = AttributePath::new("Characters", "Klein Moretti", "personality");
//! tree.append(&path, "calm").unwrap();
//! assert_eq!(tree.attribute(&path).unwrap().pending_count(), 1);
//! ```

pub mod agent;
pub mod config;
pub mod context;
pub mod ingest;
pub mod processor;
pub mod prompt;
pub mod storage;
pub mod wiki;

pub use agent::{AgentClient, AgentError, AgentRequest, AgentTask, CommandAgent, MockAgent};
pub use config::{BuildConfig, ConfigError};
pub use context::RunningContext;
pub use ingest::IngestError;
pub use processor::{
    BuildError, BuildSummary, CancellationToken, Chunk, ChunkError, ChunkId, ChunkProcessor,
    ChunkReport, FailureDecision, RetryPolicy, SessionState, WikiBuilder,
};
pub use storage::{
    from_blob, to_blob, OpenStore, SqliteStore, StorageError, StorageResult, WikiStore,
};
pub use wiki::{
    Attribute, AttributeKind, AttributePath, AttributeValue, ConsolidationError, Entity,
    KnowledgeTree, MergeStrategy, OperationCall, SchemaViolation, Section, SectionKind, WikiError,
    WikiResult,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
