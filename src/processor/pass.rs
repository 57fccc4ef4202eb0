//! One pass of the chunk processor over one chunk
//!
//! Stages run strictly in order:
//!
//! ```text
//! BuildRequest → Extract → Apply → ConsolidatePass → UpdateContext → Done
//! ```
//!
//! Cancellation is checked before entering each stage. Writes made by
//! `Apply` are kept if the pass stops later; consolidation commits are
//! per attribute.

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::cancel::CancellationToken;
use super::chunk::{Chunk, ChunkId};
use super::consolidate::{consolidate_paths, ConsolidationReport};
use super::retry::{call_with_retry, RetryError, RetryPolicy};
use crate::agent::{
    decode, response_schema, AgentClient, AgentError, AgentRequest, AgentTask, SummaryResponse,
};
use crate::context::RunningContext;
use crate::prompt;
use crate::wiki::{
    AppliedOperation, AttributePath, EntityPath, ExtractionEnvelope, KnowledgeTree, OperationCall,
    SchemaViolation,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStage {
    BuildRequest,
    Extract,
    Apply,
    ConsolidatePass,
    UpdateContext,
    Done,
}

impl std::fmt::Display for ChunkStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::BuildRequest => "build_request",
            Self::Extract => "extract",
            Self::Apply => "apply",
            Self::ConsolidatePass => "consolidate_pass",
            Self::UpdateContext => "update_context",
            Self::Done => "done",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ChunkError {
    #[error("extraction failed for {chunk} after {attempts} attempts: {source}")]
    Extraction {
        chunk: ChunkId,
        attempts: u32,
        source: AgentError,
    },

    #[error("cannot build the operation table for {chunk}: {reason}")]
    InvalidTree { chunk: ChunkId, reason: String },

    #[error("{chunk} cancelled before {stage}")]
    Cancelled { chunk: ChunkId, stage: ChunkStage },
}

/// An operation dropped during `Apply`.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub call: OperationCall,
    pub reason: SchemaViolation,
}

/// Where the chunk's new context summary came from.
#[derive(Debug, Clone, PartialEq)]
pub enum ContextUpdate {
    /// The extraction emitted `generate_chunk_summary`
    FromExtraction,
    /// The summary agent was asked
    FromSummaryAgent,
    /// The summary agent failed; the prior context was kept
    Kept { error: String },
}

/// What happened while processing one chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkReport {
    pub chunk: ChunkId,
    pub extraction_attempts: u32,
    pub applied: Vec<AppliedOperation>,
    pub rejections: Vec<Rejection>,
    /// Attributes written in this chunk, in order of first touch
    pub touched: Vec<AttributePath>,
    pub consolidation: ConsolidationReport,
    pub context_update: ContextUpdate,
}

impl ChunkReport {
    pub fn context_updated(&self) -> bool {
        !matches!(self.context_update, ContextUpdate::Kept { .. })
    }
}

/// A finished pass: its report and the context for the next chunk.
#[derive(Debug, Clone)]
pub struct ChunkOutcome {
    pub report: ChunkReport,
    pub context: RunningContext,
}

/// Drives a single chunk through extraction, buffering, consolidation
/// and context update.
#[derive(Clone)]
pub struct ChunkProcessor {
    agent: Arc<dyn AgentClient>,
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl ChunkProcessor {
    pub fn new(agent: Arc<dyn AgentClient>, policy: RetryPolicy) -> Self {
        Self {
            agent,
            policy,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn agent(&self) -> &dyn AgentClient {
        self.agent.as_ref()
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    fn enter(&self, chunk: ChunkId, stage: ChunkStage) -> Result<(), ChunkError> {
        if self.cancel.is_cancelled() {
            return Err(ChunkError::Cancelled { chunk, stage });
        }
        debug!(%chunk, %stage, "entering stage");
        Ok(())
    }

    /// Process one chunk against `context`, which is not modified.
    ///
    /// The returned context replaces `context` for the next chunk.
    pub async fn process(
        &self,
        tree: &mut KnowledgeTree,
        context: &RunningContext,
        chunk: &Chunk,
    ) -> Result<ChunkOutcome, ChunkError> {
        let id = chunk.id();

        self.enter(id, ChunkStage::BuildRequest)?;
        let table = tree.operation_table().map_err(|e| ChunkError::InvalidTree {
            chunk: id,
            reason: e.to_string(),
        })?;
        let request = AgentRequest {
            task: AgentTask::Extract,
            system: prompt::EXTRACTION_SYSTEM.to_string(),
            prompt: prompt::extraction_prompt(chunk, context),
            schema: table.response_schema(),
        };

        self.enter(id, ChunkStage::Extract)?;
        let decoder = decode::<ExtractionEnvelope>;
        let extracted = call_with_retry(self.agent(), &request, &self.policy, &self.cancel, decoder)
            .await
            .map_err(|e| match e {
                RetryError::Exhausted { attempts, last } => ChunkError::Extraction {
                    chunk: id,
                    attempts,
                    source: last,
                },
                RetryError::Cancelled { .. } => ChunkError::Cancelled {
                    chunk: id,
                    stage: ChunkStage::Extract,
                },
            })?;

        self.enter(id, ChunkStage::Apply)?;
        let mut applied = Vec::new();
        let mut rejections = Vec::new();
        let mut touched: Vec<AttributePath> = Vec::new();
        let mut entities: Vec<EntityPath> = Vec::new();
        let mut chunk_summary: Option<String> = None;

        for call in extracted.value.calls {
            match tree.apply_operation(&table, &call) {
                Ok(op) => {
                    match &op {
                        AppliedOperation::EntityResolved { path, .. } => {
                            push_unique(&mut entities, path.clone())
                        }
                        AppliedOperation::Appended { path, .. } => {
                            push_unique(&mut entities, path.entity_path());
                            push_unique(&mut touched, path.clone());
                        }
                        AppliedOperation::ChunkSummary(s) if !s.is_empty() => {
                            chunk_summary = Some(s.clone())
                        }
                        AppliedOperation::ChunkSummary(_) | AppliedOperation::Noop => {}
                    }
                    applied.push(op);
                }
                Err(reason) => {
                    warn!(
                        chunk = %id,
                        operation = %call.name,
                        error = %reason,
                        "dropping operation"
                    );
                    rejections.push(Rejection { call, reason });
                }
            }
        }

        self.enter(id, ChunkStage::ConsolidatePass)?;
        let consolidation = consolidate_paths(
            tree,
            &touched,
            false,
            self.agent(),
            &self.policy,
            &self.cancel,
        )
        .await;

        self.enter(id, ChunkStage::UpdateContext)?;
        let (next_context, context_update) = match chunk_summary {
            Some(summary) => (context.advanced(&summary), ContextUpdate::FromExtraction),
            None => self.summarize(chunk, context, &entities).await,
        };

        info!(
            chunk = %id,
            applied = applied.len(),
            rejected = rejections.len(),
            consolidated = consolidation.consolidated.len(),
            consolidation_failures = consolidation.failures.len(),
            "chunk done"
        );

        Ok(ChunkOutcome {
            report: ChunkReport {
                chunk: id,
                extraction_attempts: extracted.attempts,
                applied,
                rejections,
                touched,
                consolidation,
                context_update,
            },
            context: next_context,
        })
    }

    async fn summarize(
        &self,
        chunk: &Chunk,
        context: &RunningContext,
        entities: &[EntityPath],
    ) -> (RunningContext, ContextUpdate) {
        let names: Vec<String> = entities.iter().map(ToString::to_string).collect();
        let request = AgentRequest {
            task: AgentTask::Summarize,
            system: prompt::SUMMARY_SYSTEM.to_string(),
            prompt: prompt::summary_prompt(chunk, context, &names),
            schema: response_schema::<SummaryResponse>(),
        };

        let decoder = decode::<SummaryResponse>;
        match call_with_retry(self.agent(), &request, &self.policy, &self.cancel, decoder).await {
            Ok(out) => (context.advanced(&out.value.summary), ContextUpdate::FromSummaryAgent),
            Err(e) => {
                warn!(
                    chunk = %chunk.id(),
                    error = %e,
                    "context update failed, keeping prior context"
                );
                (context.clone(), ContextUpdate::Kept { error: e.to_string() })
            }
        }
    }
}

fn push_unique<T: PartialEq>(items: &mut Vec<T>, item: T) {
    if !items.contains(&item) {
        items.push(item);
    }
}
