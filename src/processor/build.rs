//! WikiBuilder: runs the chunk processor over an ordered input
//!
//! The builder owns the session bookkeeping the per-chunk pass does not:
//! ordering checks, resume skipping, the cursor, the failure policy and
//! checkpoints to the store.

use std::sync::Arc;
use tracing::{info, warn};

use super::chunk::{Chunk, ChunkId};
use super::consolidate::{consolidate_paths, ConsolidationReport};
use super::pass::{ChunkError, ChunkProcessor, ChunkReport};
use super::session::SessionState;
use crate::storage::{StorageError, WikiStore};
use crate::wiki::KnowledgeTree;

/// What to do with a chunk whose pass failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDecision {
    /// Run the same chunk again
    Retry,
    /// Record the chunk as skipped and move on
    Skip,
    /// Stop the build
    Halt,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("input out of order: {next} follows {previous}")]
    OutOfOrder { previous: ChunkId, next: ChunkId },

    #[error("build halted at {chunk}: {source}")]
    ChunkFailed { chunk: ChunkId, source: ChunkError },

    #[error("build cancelled at {0}")]
    Cancelled(ChunkId),

    #[error("checkpoint failed: {0}")]
    Storage(#[from] StorageError),
}

/// Counters for one `run`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildSummary {
    pub processed: u64,
    /// Chunks at or before the session cursor
    pub already_done: u64,
    /// Chunks given up on by the failure policy
    pub skipped: Vec<ChunkId>,
    pub retries: u64,
    pub operations_applied: u64,
    pub rejections: u64,
    pub consolidations: u64,
    pub consolidation_failures: u64,
    pub checkpoints: u64,
}

impl BuildSummary {
    fn record(&mut self, report: &ChunkReport) {
        self.processed += 1;
        self.operations_applied += report.applied.len() as u64;
        self.rejections += report.rejections.len() as u64;
        self.consolidations += report.consolidation.consolidated.len() as u64;
        self.consolidation_failures += report.consolidation.failures.len() as u64;
    }
}

pub struct WikiBuilder {
    processor: ChunkProcessor,
    store: Option<Arc<dyn WikiStore>>,
    checkpoint_every: u64,
}

impl WikiBuilder {
    pub fn new(processor: ChunkProcessor) -> Self {
        Self {
            processor,
            store: None,
            checkpoint_every: 0,
        }
    }

    /// Save tree and session to `store` every `every` finished chunks and
    /// when a run ends. Zero means only at the end.
    pub fn with_store(mut self, store: Arc<dyn WikiStore>, every: u64) -> Self {
        self.store = Some(store);
        self.checkpoint_every = every;
        self
    }

    pub fn processor(&self) -> &ChunkProcessor {
        &self.processor
    }

    fn checkpoint(
        &self,
        tree: &KnowledgeTree,
        session: &mut SessionState,
        summary: &mut BuildSummary,
    ) -> Result<(), BuildError> {
        if let Some(store) = &self.store {
            session.touch();
            store.save(tree, session)?;
            summary.checkpoints += 1;
            info!(wiki = %tree.name, cursor = ?session.cursor, "checkpoint saved");
        }
        Ok(())
    }

    /// Process `chunks` in order.
    ///
    /// Chunks the session already finished are skipped. Input must be
    /// strictly increasing by `(book, index)`; the first violation stops the
    /// run with [`BuildError::OutOfOrder`]. A failed chunk is handed to
    /// `on_failure`. The store, if any, receives a final checkpoint whether
    /// the run completes, halts or is cancelled.
    pub async fn run<I, F>(
        &self,
        tree: &mut KnowledgeTree,
        session: &mut SessionState,
        chunks: I,
        mut on_failure: F,
    ) -> Result<BuildSummary, BuildError>
    where
        I: IntoIterator<Item = Chunk>,
        F: FnMut(&Chunk, &ChunkError) -> FailureDecision,
    {
        let mut summary = BuildSummary::default();
        let mut previous: Option<ChunkId> = None;
        let mut since_checkpoint = 0u64;

        info!(wiki = %tree.name, session = %session.id, cursor = ?session.cursor, "build started");

        for chunk in chunks {
            let id = chunk.id();
            if let Some(prev) = previous {
                if id <= prev {
                    self.checkpoint(tree, session, &mut summary)?;
                    return Err(BuildError::OutOfOrder { previous: prev, next: id });
                }
            }
            previous = Some(id);

            if session.is_done(id) {
                summary.already_done += 1;
                continue;
            }

            loop {
                match self.processor.process(tree, &session.context, &chunk).await {
                    Ok(outcome) => {
                        summary.record(&outcome.report);
                        session.context = outcome.context;
                        session.cursor = Some(id);
                        session.chunks_done += 1;
                        session.operations_applied += outcome.report.applied.len() as u64;
                        session.rejections += outcome.report.rejections.len() as u64;
                        session.consolidations +=
                            outcome.report.consolidation.consolidated.len() as u64;
                        break;
                    }
                    Err(ChunkError::Cancelled { .. }) => {
                        self.checkpoint(tree, session, &mut summary)?;
                        return Err(BuildError::Cancelled(id));
                    }
                    Err(err) => match on_failure(&chunk, &err) {
                        FailureDecision::Retry => {
                            warn!(chunk = %id, error = %err, "retrying chunk");
                            summary.retries += 1;
                        }
                        FailureDecision::Skip => {
                            warn!(chunk = %id, error = %err, "skipping chunk");
                            summary.skipped.push(id);
                            session.skipped.push(id);
                            break;
                        }
                        FailureDecision::Halt => {
                            self.checkpoint(tree, session, &mut summary)?;
                            return Err(BuildError::ChunkFailed { chunk: id, source: err });
                        }
                    },
                }
            }

            since_checkpoint += 1;
            if self.checkpoint_every > 0 && since_checkpoint >= self.checkpoint_every {
                self.checkpoint(tree, session, &mut summary)?;
                since_checkpoint = 0;
            }
        }

        self.checkpoint(tree, session, &mut summary)?;
        info!(
            wiki = %tree.name,
            processed = summary.processed,
            already_done = summary.already_done,
            skipped = summary.skipped.len(),
            "build finished"
        );
        Ok(summary)
    }

    /// Consolidate outstanding buffers across the whole tree.
    ///
    /// With `force` every non-empty buffer is folded, regardless of
    /// cadence; otherwise only attributes that are due.
    pub async fn flush(&self, tree: &mut KnowledgeTree, force: bool) -> ConsolidationReport {
        let paths = tree.pending_paths();
        let report = consolidate_paths(
            tree,
            &paths,
            force,
            self.processor.agent(),
            self.processor.policy(),
            self.processor.cancellation(),
        )
        .await;
        info!(
            wiki = %tree.name,
            consolidated = report.consolidated.len(),
            failed = report.failures.len(),
            "flush finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentTask, MockAgent};
    use crate::processor::RetryPolicy;
    use crate::storage::{OpenStore, SqliteStore};
    use crate::wiki::{AttributePath, Section, SectionKind, CHUNK_SUMMARY_OP};
    use serde_json::json;

    fn tree() -> KnowledgeTree {
        KnowledgeTree::new("lotm")
            .with_section(Section::new("Characters", SectionKind::Characters))
            .unwrap()
    }

    fn summary_only(agent: MockAgent) -> MockAgent {
        agent.with_responder(AgentTask::Extract, |req| {
            let text = req.prompt.rsplit("\n\n").next().unwrap_or_default().to_string();
            let call = json!({ "name": CHUNK_SUMMARY_OP, "args": { "summary": text } });
            Ok(json!({ "calls": [call] }).to_string())
        })
    }

    fn make_builder(agent: MockAgent) -> WikiBuilder {
        let policy = RetryPolicy {
            max_attempts: 1,
            ..RetryPolicy::default()
        };
        WikiBuilder::new(ChunkProcessor::new(Arc::new(agent), policy))
    }

    #[tokio::test(start_paused = true)]
    async fn cursor_advances_and_resume_skips_done_chunks() {
        let builder = make_builder(summary_only(MockAgent::new()));
        let mut tree = tree();
        let mut session = SessionState::default();

        let chunks = vec![Chunk::new(1, 0, "a"), Chunk::new(1, 1, "b")];
        let first = builder
            .run(&mut tree, &mut session, chunks.clone(), |_, _| FailureDecision::Halt)
            .await
            .unwrap();
        assert_eq!(first.processed, 2);
        assert_eq!(session.cursor, Some(ChunkId::new(1, 1)));

        let mut more = chunks;
        more.push(Chunk::new(2, 0, "c"));
        let second = builder
            .run(&mut tree, &mut session, more, |_, _| FailureDecision::Halt)
            .await
            .unwrap();
        assert_eq!(second.already_done, 2);
        assert_eq!(second.processed, 1);
        assert_eq!(session.chunks_done, 3);
        assert_eq!(session.context.latest(), Some("c"));
    }

    #[tokio::test(start_paused = true)]
    async fn out_of_order_input_is_rejected() {
        let builder = make_builder(summary_only(MockAgent::new()));
        let mut session = SessionState::default();

        let err = builder
            .run(
                &mut tree(),
                &mut session,
                vec![Chunk::new(1, 1, "b"), Chunk::new(1, 0, "a")],
                |_, _| FailureDecision::Halt,
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            BuildError::OutOfOrder { previous, next }
                if previous == ChunkId::new(1, 1) && next == ChunkId::new(1, 0)
        ));
        assert_eq!(session.cursor, Some(ChunkId::new(1, 1)));
    }

    #[tokio::test(start_paused = true)]
    async fn failure_policy_decides() {
        let agent = summary_only(MockAgent::new().with_response(AgentTask::Extract, "garbage"));
        let builder = make_builder(agent);
        let mut session = SessionState::default();
        let mut seen = 0;

        let summary = builder
            .run(&mut tree(), &mut session, vec![Chunk::new(1, 0, "a")], |_, _| {
                seen += 1;
                FailureDecision::Retry
            })
            .await
            .unwrap();
        assert_eq!(seen, 1);
        assert_eq!(summary.retries, 1);
        assert_eq!(summary.processed, 1);

        let garbage = MockAgent::new().with_response(AgentTask::Extract, "garbage");
        let skipping = make_builder(summary_only(garbage));
        let mut session = SessionState::default();
        let summary = skipping
            .run(
                &mut tree(),
                &mut session,
                vec![Chunk::new(1, 0, "a"), Chunk::new(1, 1, "b")],
                |_, _| FailureDecision::Skip,
            )
            .await
            .unwrap();
        assert_eq!(summary.skipped, vec![ChunkId::new(1, 0)]);
        assert_eq!(session.cursor, Some(ChunkId::new(1, 1)));
    }

    #[tokio::test(start_paused = true)]
    async fn halt_returns_chunk_failed_and_checkpoints() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let agent = summary_only(MockAgent::new())
            .with_response(
                AgentTask::Extract,
                r#"{"calls": [{"name": "generate_chunk_summary", "args": {"summary": "a"}}]}"#,
            )
            .with_response(AgentTask::Extract, "garbage");
        let builder = make_builder(agent).with_store(store.clone(), 0);
        let mut tree = tree();
        let mut session = SessionState::default();

        let err = builder
            .run(
                &mut tree,
                &mut session,
                vec![Chunk::new(1, 0, "a"), Chunk::new(1, 1, "b")],
                |_, _| FailureDecision::Halt,
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            BuildError::ChunkFailed { chunk, .. } if chunk == ChunkId::new(1, 1)
        ));
        let (_, stored) = store.load("lotm").unwrap().unwrap();
        assert_eq!(stored.cursor, Some(ChunkId::new(1, 0)));
    }

    #[tokio::test(start_paused = true)]
    async fn flush_forces_outstanding_buffers() {
        let agent = MockAgent::new().with_response(AgentTask::Consolidate, r#"{"data": "Calm."}"#);
        let builder = make_builder(agent);
        let mut tree = tree();
        let path = AttributePath::new("Characters", "Klein", "personality");
        tree.append(&path, "calm").unwrap();

        let lazy = builder.flush(&mut tree, false).await;
        assert!(lazy.consolidated.is_empty());

        let forced = builder.flush(&mut tree, true).await;
        assert_eq!(forced.consolidated, vec![path.clone()]);
        assert!(tree.pending_paths().is_empty());
    }
}
