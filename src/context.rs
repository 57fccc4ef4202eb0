//! Running context: a bounded rolling window of chunk summaries
//!
//! The context is read-only while a chunk is being extracted and replaced
//! wholesale once the chunk is done, so a chunk's request only ever sees
//! summaries of earlier chunks.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

pub const DEFAULT_WINDOW: usize = 5;
pub const DEFAULT_MAX_SUMMARY_CHARS: usize = 2000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningContext {
    summaries: VecDeque<String>,
    window: usize,
    max_summary_chars: usize,
    /// Total summaries ever folded in, including ones that fell out of the window
    chunks_seen: u64,
}

impl Default for RunningContext {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW, DEFAULT_MAX_SUMMARY_CHARS)
    }
}

impl RunningContext {
    /// Empty context. A window of zero is clamped to one.
    pub fn new(window: usize, max_summary_chars: usize) -> Self {
        Self {
            summaries: VecDeque::new(),
            window: window.max(1),
            max_summary_chars,
            chunks_seen: 0,
        }
    }

    /// The context that follows this one once `summary` is added.
    ///
    /// The oldest summary drops out when the window is full.
    pub fn advanced(&self, summary: &str) -> Self {
        let mut next = self.clone();
        next.summaries.push_back(truncate_chars(summary.trim(), self.max_summary_chars));
        while next.summaries.len() > next.window {
            next.summaries.pop_front();
        }
        next.chunks_seen += 1;
        next
    }

    /// Prior summaries as fenced blocks, oldest first.
    pub fn render(&self) -> String {
        self.summaries
            .iter()
            .map(|s| format!("```\n{}\n```\n\n", s))
            .collect()
    }

    pub fn summaries(&self) -> impl Iterator<Item = &str> {
        self.summaries.iter().map(String::as_str)
    }

    pub fn latest(&self) -> Option<&str> {
        self.summaries.back().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.summaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.summaries.is_empty()
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn chunks_seen(&self) -> u64 {
        self.chunks_seen
    }

    /// Adopt new limits, trimming the window if it shrank.
    pub fn with_limits(mut self, window: usize, max_summary_chars: usize) -> Self {
        self.window = window.max(1);
        self.max_summary_chars = max_summary_chars;
        while self.summaries.len() > self.window {
            self.summaries.pop_front();
        }
        self
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    if max == 0 {
        return s.to_string();
    }
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}
