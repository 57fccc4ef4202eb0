//! Session state: everything besides the tree needed to resume a build

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::chunk::ChunkId;
use crate::context::RunningContext;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub context: RunningContext,
    /// Last chunk that reached `Done`
    pub cursor: Option<ChunkId>,
    #[serde(default)]
    pub chunks_done: u64,
    /// Chunks given up on by the failure policy
    #[serde(default)]
    pub skipped: Vec<ChunkId>,
    #[serde(default)]
    pub operations_applied: u64,
    #[serde(default)]
    pub rejections: u64,
    #[serde(default)]
    pub consolidations: u64,
}

impl SessionState {
    pub fn new(context: RunningContext) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            started_at: now,
            updated_at: now,
            context,
            cursor: None,
            chunks_done: 0,
            skipped: Vec::new(),
            operations_applied: 0,
            rejections: 0,
            consolidations: 0,
        }
    }

    /// Whether `id` reached `Done` in an earlier run.
    pub fn is_done(&self, id: ChunkId) -> bool {
        self.cursor.is_some_and(|cursor| id <= cursor)
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new(RunningContext::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_marks_earlier_chunks_done() {
        let mut session = SessionState::default();
        assert!(!session.is_done(ChunkId::new(1, 0)));

        session.cursor = Some(ChunkId::new(1, 5));
        assert!(session.is_done(ChunkId::new(1, 5)));
        assert!(session.is_done(ChunkId::new(1, 2)));
        assert!(!session.is_done(ChunkId::new(2, 0)));
    }
}
