//! Shared helpers for the lorebook integration tests
//!
//! `story_agent` is a deterministic stand-in for the real agent: chunk
//! text is written in a tiny line format that it turns into operations.

pub mod fixtures;
pub mod story_agent;

pub use fixtures::{builder, fast_policy, lotm_tree, stored_builder};
pub use story_agent::{
    current_chunk, story_agent, story_agent_failing_on, story_agent_with, StoryAgentOptions,
};
