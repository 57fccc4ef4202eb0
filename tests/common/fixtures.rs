//! Trees, policies and builders used across tests

use lorebook::processor::RetryPolicy;
use lorebook::{
    ChunkProcessor, KnowledgeTree, MockAgent, Section, SectionKind, WikiBuilder, WikiStore,
};
use std::sync::Arc;
use std::time::Duration;

/// Characters and Settings with their stock templates.
pub fn lotm_tree() -> KnowledgeTree {
    KnowledgeTree::new("lotm")
        .with_section(Section::new("Characters", SectionKind::Characters))
        .unwrap()
        .with_section(Section::new("Settings", SectionKind::Settings))
        .unwrap()
}

/// Two attempts, short backoff. Tests run on paused time anyway.
pub fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 2,
        initial_backoff: Duration::from_millis(10),
        max_backoff: Duration::from_millis(50),
        backoff_multiplier: 2.0,
        timeout: Duration::from_secs(5),
    }
}

pub fn builder(agent: MockAgent) -> WikiBuilder {
    WikiBuilder::new(ChunkProcessor::new(Arc::new(agent), fast_policy()))
}

pub fn stored_builder(agent: MockAgent, store: Arc<dyn WikiStore>) -> WikiBuilder {
    builder(agent).with_store(store, 1)
}
