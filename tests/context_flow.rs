//! Running context threading between chunks

mod common;

use common::{builder, current_chunk, lotm_tree, story_agent};
use lorebook::{AgentTask, Chunk, FailureDecision, SessionState};

#[tokio::test(start_paused = true)]
async fn earlier_summaries_reach_later_requests_only() {
    let agent = std::sync::Arc::new(story_agent());
    let processor = lorebook::ChunkProcessor::new(agent.clone(), common::fast_policy());
    let builder = lorebook::WikiBuilder::new(processor);
    let mut tree = lotm_tree();
    let mut session = SessionState::default();

    let chunks = vec![
        Chunk::new(
            1,
            0,
            "character Klein | trivia | wakes up with a headache\n\
             summary | Klein wakes up in Tingen",
        ),
        Chunk::new(
            1,
            1,
            "character Audrey | trivia | owns a golden retriever\n\
             summary | Audrey joins the Tarot Club",
        ),
    ];
    builder
        .run(&mut tree, &mut session, chunks, |_, _| FailureDecision::Halt)
        .await
        .unwrap();

    let requests = agent.requests_for(AgentTask::Extract);
    assert_eq!(requests.len(), 2);

    let (c1, c2) = (&requests[0].prompt, &requests[1].prompt);
    assert!(!c1.contains("Audrey"));
    assert!(c2.contains("Klein wakes up in Tingen"));

    let context_at = c2.find("Klein wakes up in Tingen").unwrap();
    let chunk_at = c2.find("owns a golden retriever").unwrap();
    assert!(context_at < chunk_at);
    assert!(!current_chunk(&requests[1]).contains("Klein wakes up in Tingen"));

    assert_eq!(
        session.context.summaries().collect::<Vec<_>>(),
        vec!["Klein wakes up in Tingen", "Audrey joins the Tarot Club"]
    );
}

#[tokio::test(start_paused = true)]
async fn summary_agent_fills_in_when_extraction_has_none() {
    let agent = std::sync::Arc::new(story_agent());
    let processor = lorebook::ChunkProcessor::new(agent.clone(), common::fast_policy());
    let builder = lorebook::WikiBuilder::new(processor);
    let mut session = SessionState::default();

    builder
        .run(
            &mut lotm_tree(),
            &mut session,
            vec![Chunk::new(1, 0, "character Klein | trivia | buys a revolver")],
            |_, _| FailureDecision::Halt,
        )
        .await
        .unwrap();

    let summarize = agent.requests_for(AgentTask::Summarize);
    assert_eq!(summarize.len(), 1);
    assert!(summarize[0].prompt.contains("Characters/Klein"));
    assert_eq!(
        session.context.latest(),
        Some("Summary: character Klein | trivia | buys a revolver")
    );
}

#[tokio::test(start_paused = true)]
async fn window_keeps_only_recent_summaries() {
    let builder = builder(story_agent());
    let mut session = SessionState::new(lorebook::RunningContext::new(2, 500));

    let chunks: Vec<Chunk> = (0..4)
        .map(|i| Chunk::new(1, i, format!("index\nsummary | part {}", i)))
        .collect();
    builder
        .run(&mut lotm_tree(), &mut session, chunks, |_, _| FailureDecision::Halt)
        .await
        .unwrap();

    assert_eq!(session.context.summaries().collect::<Vec<_>>(), vec!["part 2", "part 3"]);
    assert_eq!(session.context.chunks_seen(), 4);
}
