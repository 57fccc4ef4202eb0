//! Chunk processing pipeline
//!
//! `ChunkProcessor` runs one chunk through extraction, buffering,
//! consolidation and context update. `WikiBuilder` drives it over an
//! ordered input and keeps the resumable `SessionState`.

mod build;
mod cancel;
mod chunk;
mod consolidate;
mod pass;
mod retry;
mod session;

pub use build::{BuildError, BuildSummary, FailureDecision, WikiBuilder};
pub use cancel::CancellationToken;
pub use chunk::{Chunk, ChunkId};
pub use consolidate::{consolidate_attribute, consolidate_paths, ConsolidationReport};
pub use pass::{
    ChunkError, ChunkOutcome, ChunkProcessor, ChunkReport, ChunkStage, ContextUpdate, Rejection,
};
pub use retry::{call_with_retry, Retried, RetryError, RetryPolicy};
pub use session::SessionState;
