//! Failure handling, checkpoints and resuming from the store

mod common;

use common::{builder, fast_policy, lotm_tree, story_agent, story_agent_failing_on, stored_builder};
use lorebook::processor::{ChunkError, ChunkId};
use lorebook::{
    from_blob, to_blob, AgentError, AttributePath, BuildError, CancellationToken, Chunk,
    ChunkProcessor, FailureDecision, OpenStore, SessionState, SqliteStore, WikiBuilder, WikiStore,
};
use std::sync::Arc;

fn story() -> Vec<Chunk> {
    vec![
        Chunk::new(1, 0, "character Klein | personality | calm\nsummary | first"),
        Chunk::new(1, 1, "character Klein | personality | CURSED\nsummary | second"),
        Chunk::new(2, 0, "setting Backlund | description | foggy\nsummary | third"),
    ]
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_halt_the_build() {
    let builder = builder(story_agent_failing_on("CURSED"));
    let mut tree = lotm_tree();
    let mut session = SessionState::default();

    let err = builder
        .run(&mut tree, &mut session, story(), |_, _| FailureDecision::Halt)
        .await
        .unwrap_err();

    match err {
        BuildError::ChunkFailed {
            chunk,
            source: ChunkError::Extraction { attempts, source, .. },
        } => {
            assert_eq!(chunk, ChunkId::new(1, 1));
            assert_eq!(attempts, fast_policy().max_attempts);
            assert!(matches!(source, AgentError::CallFailed(_)));
        }
        other => panic!("unexpected error: {other}"),
    }

    // The first chunk's writes survive and the cursor stops before the failure.
    assert_eq!(session.cursor, Some(ChunkId::new(1, 0)));
    let attr = tree.attribute(&AttributePath::new("Characters", "Klein", "personality")).unwrap();
    assert_eq!(attr.buffer(), &["calm".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn halted_build_resumes_from_the_store() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("lorebook.db");

    {
        let store = Arc::new(SqliteStore::open(&db).unwrap());
        let builder = stored_builder(story_agent_failing_on("CURSED"), store);
        let mut tree = lotm_tree();
        let mut session = SessionState::default();
        builder
            .run(&mut tree, &mut session, story(), |_, _| FailureDecision::Halt)
            .await
            .unwrap_err();
    }

    let store = Arc::new(SqliteStore::open(&db).unwrap());
    let (mut tree, mut session) = store.load("lotm").unwrap().unwrap();
    assert_eq!(session.cursor, Some(ChunkId::new(1, 0)));
    let session_id = session.id;

    let builder = stored_builder(story_agent(), store.clone());
    let summary = builder
        .run(&mut tree, &mut session, story(), |_, _| FailureDecision::Halt)
        .await
        .unwrap();

    assert_eq!(summary.already_done, 1);
    assert_eq!(summary.processed, 2);
    assert_eq!(session.id, session_id);
    assert_eq!(session.chunks_done, 3);

    let path = AttributePath::new("Characters", "Klein", "personality");
    let personality = tree.attribute(&path).unwrap();
    assert_eq!(personality.buffer(), &["calm".to_string(), "CURSED".to_string()]);

    let (stored, stored_session) = store.load("lotm").unwrap().unwrap();
    assert_eq!(stored, tree);
    assert_eq!(stored_session.cursor, Some(ChunkId::new(2, 0)));
}

#[tokio::test(start_paused = true)]
async fn skipped_chunks_are_recorded() {
    let builder = builder(story_agent_failing_on("CURSED"));
    let mut tree = lotm_tree();
    let mut session = SessionState::default();

    let summary = builder
        .run(&mut tree, &mut session, story(), |_, _| FailureDecision::Skip)
        .await
        .unwrap();

    assert_eq!(summary.skipped, vec![ChunkId::new(1, 1)]);
    assert_eq!(session.skipped, vec![ChunkId::new(1, 1)]);
    assert_eq!(session.cursor, Some(ChunkId::new(2, 0)));
    assert!(tree.section("Settings").unwrap().entity("Backlund").is_some());
}

#[tokio::test(start_paused = true)]
async fn cancellation_checkpoints_and_stops() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let cancel = CancellationToken::new();
    cancel.cancel();
    let processor =
        ChunkProcessor::new(Arc::new(story_agent()), fast_policy()).with_cancellation(cancel);
    let builder = WikiBuilder::new(processor).with_store(store.clone(), 1);

    let err = builder
        .run(&mut lotm_tree(), &mut SessionState::default(), story(), |_, _| FailureDecision::Halt)
        .await
        .unwrap_err();

    assert!(matches!(err, BuildError::Cancelled(id) if id == ChunkId::new(1, 0)));
    let (_, session) = store.load("lotm").unwrap().unwrap();
    assert_eq!(session.cursor, None);
}

#[tokio::test(start_paused = true)]
async fn built_tree_round_trips_through_blob_and_store() {
    let builder = builder(story_agent());
    let mut tree = lotm_tree();
    let mut session = SessionState::default();
    builder
        .run(&mut tree, &mut session, story(), |_, _| FailureDecision::Halt)
        .await
        .unwrap();

    let (from_snapshot, snapshot_session) = from_blob(&to_blob(&tree, &session).unwrap()).unwrap();
    assert_eq!(from_snapshot, tree);
    assert_eq!(snapshot_session, session);

    let store = SqliteStore::open_in_memory().unwrap();
    store.save(&tree, &session).unwrap();
    let (loaded, loaded_session) = store.load("lotm").unwrap().unwrap();
    assert_eq!(loaded, tree);
    assert_eq!(loaded_session, session);
}
